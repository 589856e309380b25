use ratatui::style::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeMode {
    Light,
    Dark,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appearance {
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Color,
    pub text: Color,
    pub border: Color,
    pub user: Color,
    pub assistant: Color,
    pub notice: Color,
    pub ok: Color,
    pub busy: Color,
    pub error: Color,
}

const DARK: Palette = Palette {
    background: Color::Reset,
    text: Color::Gray,
    border: Color::DarkGray,
    user: Color::Cyan,
    assistant: Color::LightBlue,
    notice: Color::Yellow,
    ok: Color::Green,
    busy: Color::Yellow,
    error: Color::Red,
};

const LIGHT: Palette = Palette {
    background: Color::White,
    text: Color::Black,
    border: Color::Gray,
    user: Color::Blue,
    assistant: Color::Black,
    notice: Color::Magenta,
    ok: Color::Green,
    busy: Color::Rgb(180, 120, 0),
    error: Color::Red,
};

/// Theme selection for one session. Created at startup and handed to the
/// renderer; only the theme key changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeContext {
    mode: ThemeMode,
    system: Appearance,
}

impl ThemeContext {
    pub fn new(mode: ThemeMode, system: Appearance) -> Self {
        Self { mode, system }
    }

    /// Follow the terminal, using the `COLORFGBG` hint when it is set.
    pub fn detect() -> Self {
        let hint = std::env::var("COLORFGBG").ok();
        Self::new(ThemeMode::System, appearance_from_colorfgbg(hint.as_deref()))
    }

    pub fn mode(&self) -> ThemeMode {
        self.mode
    }

    /// Light → Dark → System → Light.
    pub fn cycle(&mut self) {
        self.mode = match self.mode {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::System,
            ThemeMode::System => ThemeMode::Light,
        };
    }

    pub fn appearance(&self) -> Appearance {
        match self.mode {
            ThemeMode::Light => Appearance::Light,
            ThemeMode::Dark => Appearance::Dark,
            ThemeMode::System => self.system,
        }
    }

    pub fn palette(&self) -> Palette {
        match self.appearance() {
            Appearance::Light => LIGHT,
            Appearance::Dark => DARK,
        }
    }

    pub fn label(&self) -> &'static str {
        match self.mode {
            ThemeMode::Light => "☀ light",
            ThemeMode::Dark => "☾ dark",
            ThemeMode::System => "◐ system",
        }
    }
}

/// `COLORFGBG` is `fg;bg` (sometimes `fg;default;bg`) in ANSI color numbers.
/// Backgrounds 0-6 and 8 are dark; anything unparseable falls back to dark.
pub fn appearance_from_colorfgbg(value: Option<&str>) -> Appearance {
    let background = value
        .and_then(|v| v.rsplit(';').next())
        .and_then(|bg| bg.trim().parse::<u8>().ok());
    match background {
        Some(7) | Some(9..=15) => Appearance::Light,
        _ => Appearance::Dark,
    }
}
