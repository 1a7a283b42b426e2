//! Console styling
//!
//! Presentation metadata for runtimes, looked up by runtime name. The
//! adapters know nothing about it.

use colored::{ColoredString, Colorize};

/// How a runtime is presented on the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Docker,
    Containerd,
    Crio,
    Porto,
    Unknown,
}

impl Style {
    /// Style for a runtime identifier
    pub fn for_runtime(name: &str) -> Self {
        match name {
            "docker" => Style::Docker,
            "containerd" => Style::Containerd,
            "crio" | "cri-o" => Style::Crio,
            "porto" => Style::Porto,
            _ => Style::Unknown,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Style::Docker => "🐳",
            Style::Containerd => "📦",
            Style::Crio => "🎁",
            Style::Porto => "⚓",
            Style::Unknown => "🔧",
        }
    }

    /// `text` in the runtime's color
    pub fn paint(&self, text: &str) -> ColoredString {
        match self {
            Style::Docker => text.blue().bold(),
            Style::Containerd => text.cyan().bold(),
            Style::Crio => text.magenta().bold(),
            Style::Porto => text.yellow().bold(),
            Style::Unknown => text.normal(),
        }
    }

    /// Line prefix, e.g. "⚓ porto"
    pub fn prefix(&self, runtime: &str) -> String {
        format!("{} {}", self.emoji(), self.paint(runtime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(Style::for_runtime("porto"), Style::Porto);
        assert_eq!(Style::for_runtime("cri-o"), Style::Crio);
        assert_eq!(Style::for_runtime("rkt"), Style::Unknown);
    }

    #[test]
    fn test_prefix_contains_name() {
        colored::control::set_override(false);
        assert_eq!(Style::Porto.prefix("porto"), "⚓ porto");
    }
}
