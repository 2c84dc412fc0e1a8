//! Cell and color types for archived terminal rows.

use serde::{Deserialize, Serialize};

/// Terminal color supporting ANSI, 256-color palette, and true RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    /// Default terminal color
    Default,

    /// Standard ANSI colors (0-7)
    Black,
    /// ANSI Red
    Red,
    /// ANSI Green
    Green,
    /// ANSI Yellow
    Yellow,
    /// ANSI Blue
    Blue,
    /// ANSI Magenta
    Magenta,
    /// ANSI Cyan
    Cyan,
    /// ANSI White
    White,

    /// Bright ANSI colors (8-15)
    BrightBlack,
    /// Bright Red
    BrightRed,
    /// Bright Green
    BrightGreen,
    /// Bright Yellow
    BrightYellow,
    /// Bright Blue
    BrightBlue,
    /// Bright Magenta
    BrightMagenta,
    /// Bright Cyan
    BrightCyan,
    /// Bright White
    BrightWhite,

    /// 256-color palette index (0-255)
    Indexed(u8),

    /// True color RGB (24-bit)
    Rgb {
        /// Red component
        r: u8,
        /// Green component
        g: u8,
        /// Blue component
        b: u8,
    },
}

/// Display attributes for an archived cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CellAttributes {
    /// Bold/bright text
    pub bold: bool,
    /// Dimmed text
    pub dim: bool,
    /// Italic text
    pub italic: bool,
    /// Underlined text
    pub underline: bool,
    /// Blinking text
    pub blink: bool,
    /// Reverse video (swap fg/bg)
    pub reverse: bool,
    /// Hidden text
    pub hidden: bool,
    /// Strikethrough text
    pub strikethrough: bool,
    /// Row continues on the next row (soft wrap). Only meaningful on the
    /// last cell of a row.
    pub autowrapped: bool,
}

impl CellAttributes {
    /// Check if attributes are all default (no formatting, no wrap marker).
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Create attributes with bold enabled.
    pub fn with_bold(mut self) -> Self {
        self.bold = true;
        self
    }

    /// Create attributes with the soft-wrap marker set.
    pub fn with_autowrapped(mut self) -> Self {
        self.autowrapped = true;
        self
    }
}

/// Single character cell of an archived row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Unicode character (space if empty)
    pub character: char,
    /// Foreground color
    pub fg: Color,
    /// Background color
    pub bg: Color,
    /// Text attributes
    pub attrs: CellAttributes,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            character: ' ',
            fg: Color::Default,
            bg: Color::Default,
            attrs: CellAttributes::default(),
        }
    }
}

impl Cell {
    /// Bytes charged to the memory ledger for every stored cell.
    pub const BYTES: usize = std::mem::size_of::<Cell>();

    /// Create a new cell with a character and default styling.
    pub fn new(character: char) -> Self {
        Self {
            character,
            ..Default::default()
        }
    }

    /// Create a cell with character and foreground color.
    pub fn with_fg(character: char, fg: Color) -> Self {
        Self {
            character,
            fg,
            ..Default::default()
        }
    }

    /// Check if cell is blank (space with default attributes and colors).
    pub fn is_blank(&self) -> bool {
        self.character == ' '
            && self.fg == Color::Default
            && self.bg == Color::Default
            && CellAttributes {
                autowrapped: false,
                ..self.attrs
            }
            .is_default()
    }

    /// Check if this cell marks a soft-wrapped row end.
    pub fn is_autowrapped(&self) -> bool {
        self.attrs.autowrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_serialization() {
        let color = Color::Rgb {
            r: 255,
            g: 128,
            b: 0,
        };
        let json = serde_json::to_string(&color).unwrap();
        let deserialized: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(color, deserialized);

        let json = serde_json::to_string(&Color::BrightBlue).unwrap();
        assert_eq!(json, "\"bright_blue\"");
    }

    #[test]
    fn test_cell_attributes_default() {
        let attrs = CellAttributes::default();
        assert!(attrs.is_default());
        assert!(!attrs.bold);
        assert!(!attrs.autowrapped);
    }

    #[test]
    fn test_cell_attributes_with_methods() {
        let attrs = CellAttributes::default().with_bold().with_autowrapped();

        assert!(attrs.bold);
        assert!(attrs.autowrapped);
        assert!(!attrs.underline);
        assert!(!attrs.is_default());
    }

    #[test]
    fn test_cell_default_is_blank() {
        let cell = Cell::default();
        assert_eq!(cell.character, ' ');
        assert_eq!(cell.fg, Color::Default);
        assert!(cell.is_blank());
        assert!(!cell.is_autowrapped());
    }

    #[test]
    fn test_cell_is_blank() {
        assert!(!Cell::new('X').is_blank());
        assert!(!Cell::with_fg(' ', Color::Red).is_blank());

        let bold_space = Cell {
            attrs: CellAttributes::default().with_bold(),
            ..Default::default()
        };
        assert!(!bold_space.is_blank());

        // The wrap marker alone does not make a cell visible
        let wrapped_space = Cell {
            attrs: CellAttributes::default().with_autowrapped(),
            ..Default::default()
        };
        assert!(wrapped_space.is_blank());
        assert!(wrapped_space.is_autowrapped());
    }

    #[test]
    fn test_cell_byte_cost_matches_layout() {
        assert_eq!(Cell::BYTES, std::mem::size_of::<Cell>());
        assert!(Cell::BYTES > 0);
    }
}
