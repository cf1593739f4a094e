#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub small_caps: bool,
    pub code: bool,
}

impl RunStyle {
    pub const ROMAN: RunStyle = RunStyle {
        bold: false,
        italic: false,
        small_caps: false,
        code: false,
    };

    pub fn italic() -> Self {
        RunStyle {
            italic: true,
            ..RunStyle::ROMAN
        }
    }
}

/// A styled span of source text.
#[derive(Clone, Debug, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub style: RunStyle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatterPart {
    TitlePage,
    Heading,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    ChapterHeading { number: Option<u32> },
    SectionHeading,
    Paragraph,
    BlockQuote,
    FrontMatterPage(MatterPart),
    BackMatterPage(MatterPart),
    SceneBreak,
    PageBreak,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Region {
    Front,
    Body,
    Back,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockHints {
    pub starts_new_page: bool,
    pub list_item: bool,
}

/// One unit of manuscript content. Immutable once parsed; `source_index` is the
/// position of the block in the artifact's block list.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentBlock {
    pub kind: BlockKind,
    pub runs: Vec<TextRun>,
    pub hints: BlockHints,
    pub source_index: usize,
}

impl ContentBlock {
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn region(&self) -> Region {
        match self.kind {
            BlockKind::FrontMatterPage(_) => Region::Front,
            BlockKind::BackMatterPage(_) => Region::Back,
            _ => Region::Body,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArtifactWarning {
    pub code: String,
    pub severity: Severity,
    pub message: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Manuscript {
    pub title: String,
    pub author: Option<String>,
    pub blocks: Vec<ContentBlock>,
    pub warnings: Vec<ArtifactWarning>,
}

/// A measured piece of a line. Consecutive runs with `starts_word == false`
/// belong to the same word (e.g. a bold word followed by a roman comma).
#[derive(Clone, Debug, PartialEq)]
pub struct LineRun {
    pub text: String,
    pub style: RunStyle,
    pub font_size: f32,
    pub x: f32, // relative to line start
    pub width: f32,
    pub starts_word: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    pub runs: Vec<LineRun>,
    pub width: f32,
    pub advance: f32,
    /// A single word wider than the available width, forced onto its own line.
    pub overflow: bool,
}

impl Line {
    pub fn words(&self) -> Vec<String> {
        let mut words: Vec<String> = Vec::new();
        for run in &self.runs {
            match words.last_mut() {
                Some(last) if !run.starts_word => last.push_str(&run.text),
                _ => words.push(run.text.clone()),
            }
        }
        words
    }

    pub fn text(&self) -> String {
        self.words().join(" ")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineRole {
    Body,
    Quote,
    ChapterLabel,
    ChapterHeading,
    SectionHeading,
    MatterHeading,
    TitlePage,
    SceneBreak,
}

/// A line positioned inside the text block. `x` is measured from the text
/// block's left edge, `baseline` downward from its top edge.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedLine {
    pub source_index: usize,
    pub role: LineRole,
    pub x: f32,
    pub baseline: f32,
    pub line: Line,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageKind {
    FrontMatter,
    Body,
    BackMatter,
    Blank,
}

impl PageKind {
    pub fn region(self) -> Option<Region> {
        match self {
            PageKind::FrontMatter => Some(Region::Front),
            PageKind::Body => Some(Region::Body),
            PageKind::BackMatter => Some(Region::Back),
            PageKind::Blank => None,
        }
    }

    pub fn for_region(region: Region) -> Self {
        match region {
            Region::Front => PageKind::FrontMatter,
            Region::Body => PageKind::Body,
            Region::Back => PageKind::BackMatter,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChapterMark {
    pub source_index: usize,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub kind: PageKind,
    pub lines: Vec<PlacedLine>,
    pub chapter_marks: Vec<ChapterMark>,
}

impl Page {
    pub fn new(kind: PageKind) -> Self {
        Page {
            kind,
            lines: Vec::new(),
            chapter_marks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn opens_chapter(&self) -> bool {
        self.lines
            .iter()
            .any(|l| matches!(l.role, LineRole::ChapterLabel | LineRole::ChapterHeading))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSide {
    Recto,
    Verso,
}

impl PageSide {
    /// Physical page 1 is a right-hand page.
    pub fn of(physical_number: usize) -> Self {
        if physical_number % 2 == 1 {
            PageSide::Recto
        } else {
            PageSide::Verso
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FolioStyle {
    Arabic,
    LowerRoman,
    UpperRoman,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FolioPosition {
    BottomCenter,
    TopOutside,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Folio {
    pub number: u32,
    pub text: String,
    pub position: FolioPosition,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub margin_inside: f32,
    pub margin_outside: f32,
}

impl PageGeometry {
    pub fn text_width(&self) -> f32 {
        self.width - self.margin_inside - self.margin_outside
    }

    pub fn text_height(&self) -> f32 {
        self.height - self.margin_top - self.margin_bottom
    }

    /// Left edge of the text block; the gutter is on the left of a recto page.
    pub fn text_left(&self, side: PageSide) -> f32 {
        match side {
            PageSide::Recto => self.margin_inside,
            PageSide::Verso => self.margin_outside,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssembledPage {
    pub number: usize,
    pub side: PageSide,
    pub page: Page,
    pub folio_number: u32,
    pub folio: Option<Folio>,
    pub running_head: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DocumentLayout {
    pub title: String,
    pub geometry: PageGeometry,
    pub typeface: String,
    pub font_size: f32,
    pub pages: Vec<AssembledPage>,
    pub page_count: usize,
}
