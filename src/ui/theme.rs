use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub warn: Style,
    pub info: Style,
    pub dim: Style,
    pub user: Style,
    pub assistant: Style,
}

impl Theme {
    pub fn detect() -> Self {
        if !console::Term::stdout().is_term() {
            return Self::plain();
        }
        Self::colored()
    }

    pub fn colored() -> Self {
        Self {
            header: Style::new().yellow().bold(),
            success: Style::new().green().bold(),
            warn: Style::new().yellow(),
            info: Style::new().magenta(),
            dim: Style::new().white().dimmed(),
            user: Style::new().cyan().bold(),
            assistant: Style::new().magenta().bold(),
        }
    }

    pub fn plain() -> Self {
        Self {
            header: Style::new(),
            success: Style::new(),
            warn: Style::new(),
            info: Style::new(),
            dim: Style::new(),
            user: Style::new(),
            assistant: Style::new(),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
