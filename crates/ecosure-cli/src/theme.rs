//! Biome themes: the accent colour reports are rendered with.

use clap::ValueEnum;
use colored::{Color, ColoredString, Colorize};
use serde::{Deserialize, Serialize};

#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Biome {
    #[default]
    Forest,
    Coastal,
    River,
}

impl Biome {
    pub fn name(self) -> &'static str {
        match self {
            Biome::Forest => "Forest",
            Biome::Coastal => "Coastal",
            Biome::River => "River",
        }
    }

    pub fn accent(self) -> Color {
        match self {
            Biome::Forest => Color::Green,
            Biome::Coastal => Color::Cyan,
            Biome::River => Color::Blue,
        }
    }

    pub fn paint(self, text: &str) -> ColoredString {
        text.color(self.accent())
    }

    pub fn heading(self, text: &str) -> ColoredString {
        text.color(self.accent()).bold()
    }
}

impl std::fmt::Display for Biome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
