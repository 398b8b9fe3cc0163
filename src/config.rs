//! Configuration and color scheme management for subterm.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.subterm/config.toml`
//! - Built-in color schemes (plain, tango, solarized, wombat, monokai)
//! - Font description size handling
//!
//! # Configuration File
//!
//! The configuration file is located at `~/.subterm/config.toml`:
//!
//! ```toml
//! # Color scheme: plain, tango, solarized, wombat, monokai
//! color_scheme = "tango"
//!
//! # Swap foreground and background
//! reverse = false
//!
//! # Copy/paste and font shortcuts
//! shortcuts = true
//!
//! # Font description passed to the host terminal
//! font = "Monospace 11"
//!
//! # Background transparency percent (0 keeps the scheme background)
//! transparency = 0
//!
//! # Scrollback lines, -1 = unlimited
//! scrollback = -1
//!
//! # Forward the child's bell to the host
//! audible_bell = false
//!
//! # Propagate the child's title to the host terminal
//! decorated = true
//! ```
//!
//! Command-line flags override file values; a missing or malformed file
//! silently falls back to the defaults.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::command::home_dir;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Color scheme name
    pub color_scheme: String,
    /// Swap scheme foreground/background
    pub reverse: bool,
    /// Copy/paste/font shortcuts enabled
    pub shortcuts: bool,
    /// Propagate the child's title to the host terminal
    pub decorated: bool,
    /// Font description string
    pub font: String,
    /// Background transparency percent, 0-100
    pub transparency: u8,
    /// Scrollback lines, -1 = unlimited
    pub scrollback: i64,
    /// Forward the child's audible bell
    pub audible_bell: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            color_scheme: "plain".to_string(),
            reverse: false,
            shortcuts: true,
            decorated: true,
            font: "Monospace 11".to_string(),
            transparency: 0,
            scrollback: -1,
            audible_bell: false,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Self {
        if let Some(path) = Self::get_config_path() {
            if path.exists() {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(config) = toml::from_str(&content) {
                        return config;
                    }
                }
            }
        }
        Self::default()
    }

    /// Save configuration to file
    #[allow(dead_code)]
    pub fn save(&self) -> Result<(), String> {
        if let Some(path) = Self::get_config_path() {
            let content = toml::to_string_pretty(self)
                .map_err(|e| format!("Failed to serialize config: {}", e))?;
            fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;
            Ok(())
        } else {
            Err("Could not determine config path".to_string())
        }
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        if let Some(home) = home_dir() {
            let subterm_dir = home.join(".subterm");
            if !subterm_dir.exists() {
                let _ = fs::create_dir_all(&subterm_dir);
            }
            return Some(subterm_dir.join("config.toml"));
        }
        None
    }

    /// Get the color scheme, with the reverse swap applied
    pub fn get_color_scheme(&self) -> ColorScheme {
        let scheme = ColorScheme::by_name(&self.color_scheme);
        if self.reverse {
            scheme.reversed()
        } else {
            scheme
        }
    }
}

/// Scrollback capacity for the parser; negative means unlimited.
pub fn scrollback_len(lines: i64) -> usize {
    if lines < 0 {
        usize::MAX
    } else {
        lines as usize
    }
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }

    /// `#rrggbb` form for OSC color assignments
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Color scheme definition: a foreground/background pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorScheme {
    pub name: &'static str,
    pub foreground: Color,
    pub background: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::plain()
    }
}

impl ColorScheme {
    /// Black on white
    pub fn plain() -> Self {
        Self {
            name: "plain",
            foreground: Color::new(0, 0, 0),
            background: Color::new(255, 255, 255),
        }
    }

    /// Tango scheme
    pub fn tango() -> Self {
        Self {
            name: "tango",
            foreground: Color::new(46, 52, 54),
            background: Color::new(238, 238, 236),
        }
    }

    /// Solarized light scheme
    pub fn solarized() -> Self {
        Self {
            name: "solarized",
            foreground: Color::new(7, 54, 66),
            background: Color::new(238, 232, 213),
        }
    }

    /// Wombat scheme
    pub fn wombat() -> Self {
        Self {
            name: "wombat",
            foreground: Color::new(36, 36, 36),
            background: Color::new(246, 243, 232),
        }
    }

    /// Monokai scheme
    pub fn monokai() -> Self {
        Self {
            name: "monokai",
            foreground: Color::new(39, 40, 34),
            background: Color::new(248, 248, 242),
        }
    }

    /// Get scheme by name; unknown names fall back to plain
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "tango" => Self::tango(),
            "solarized" => Self::solarized(),
            "wombat" => Self::wombat(),
            "monokai" => Self::monokai(),
            _ => Self::plain(),
        }
    }

    /// List available schemes
    pub fn list() -> Vec<&'static str> {
        vec!["plain", "tango", "solarized", "wombat", "monokai"]
    }

    /// Foreground and background swapped
    pub fn reversed(mut self) -> Self {
        std::mem::swap(&mut self.foreground, &mut self.background);
        self
    }
}

/// Rewrite the trailing size in a font description, clamped to 1.
/// Descriptions without a trailing size are returned unchanged.
pub fn resize_font_description(desc: &str, delta: i32) -> String {
    let trimmed = desc.trim_end();
    match trimmed.rsplit_once(' ') {
        Some((family, size)) => match size.parse::<i32>() {
            Ok(current) => format!("{} {}", family, (current + delta).max(1)),
            Err(_) => desc.to_string(),
        },
        None => desc.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_flag_defaults() {
        let config = Config::default();
        assert_eq!(config.color_scheme, "plain");
        assert!(!config.reverse);
        assert!(config.shortcuts);
        assert!(config.decorated);
        assert_eq!(config.font, "Monospace 11");
        assert_eq!(config.transparency, 0);
        assert_eq!(config.scrollback, -1);
        assert!(!config.audible_bell);
    }

    #[test]
    fn test_scheme_by_name() {
        assert_eq!(ColorScheme::by_name("tango"), ColorScheme::tango());
        assert_eq!(ColorScheme::by_name("MONOKAI"), ColorScheme::monokai());
    }

    #[test]
    fn test_unknown_scheme_falls_back_to_plain() {
        assert_eq!(ColorScheme::by_name("no-such-scheme"), ColorScheme::plain());
    }

    #[test]
    fn test_listed_schemes_resolve_to_themselves() {
        for name in ColorScheme::list() {
            assert_eq!(ColorScheme::by_name(name).name, name);
        }
    }

    #[test]
    fn test_reversed_swaps_colors() {
        let scheme = ColorScheme::tango().reversed();
        assert_eq!(scheme.foreground, ColorScheme::tango().background);
        assert_eq!(scheme.background, ColorScheme::tango().foreground);
    }

    #[test]
    fn test_reverse_applies_through_config() {
        let config = Config {
            color_scheme: "wombat".to_string(),
            reverse: true,
            ..Default::default()
        };
        assert_eq!(config.get_color_scheme(), ColorScheme::wombat().reversed());
    }

    #[test]
    fn test_color_hex() {
        assert_eq!(Color::new(238, 238, 236).to_hex(), "#eeeeec");
        assert_eq!(Color::new(0, 0, 0).to_hex(), "#000000");
    }

    #[test]
    fn test_scrollback_len() {
        assert_eq!(scrollback_len(-1), usize::MAX);
        assert_eq!(scrollback_len(0), 0);
        assert_eq!(scrollback_len(500), 500);
    }

    #[test]
    fn test_font_grow_and_shrink() {
        assert_eq!(resize_font_description("Monospace 11", 1), "Monospace 12");
        assert_eq!(resize_font_description("Monospace 11", -1), "Monospace 10");
        assert_eq!(resize_font_description("DejaVu Sans Mono 9", 1), "DejaVu Sans Mono 10");
    }

    #[test]
    fn test_font_size_clamped_at_one() {
        assert_eq!(resize_font_description("Monospace 1", -1), "Monospace 1");
    }

    #[test]
    fn test_font_without_size_unchanged() {
        assert_eq!(resize_font_description("Monospace", 1), "Monospace");
        assert_eq!(resize_font_description("DejaVu Sans", 1), "DejaVu Sans");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Config {
            color_scheme: "solarized".to_string(),
            scrollback: 2000,
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.color_scheme, "solarized");
        assert_eq!(back.scrollback, 2000);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("color_scheme = \"tango\"").unwrap();
        assert_eq!(config.color_scheme, "tango");
        assert_eq!(config.scrollback, -1);
        assert!(config.shortcuts);
    }
}
