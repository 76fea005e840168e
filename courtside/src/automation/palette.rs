//! Stable display colours for group labels.

use std::collections::HashMap;

/// Colours handed out in order
pub const DEFAULT_COLORS: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#9a6324",
];

/// Assigns each group label a colour the first time it is seen and keeps it.
///
/// Owned by one component (the automation worker), so no locking is needed.
/// Labels beyond the palette size reuse colours from the start.
#[derive(Debug, Clone)]
pub struct GroupPalette {
    colors: Vec<String>,
    assigned: HashMap<String, usize>,
}

impl Default for GroupPalette {
    fn default() -> Self {
        Self::with_colors(DEFAULT_COLORS.iter().map(|c| c.to_string()).collect())
    }
}

impl GroupPalette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Palette with custom colours. An empty list disables colouring.
    pub fn with_colors(colors: Vec<String>) -> Self {
        Self {
            colors,
            assigned: HashMap::new(),
        }
    }

    /// Colour of `group`, assigning one on first use. Ungrouped play has none.
    pub fn color_for(&mut self, group: &str) -> Option<String> {
        if group.is_empty() || self.colors.is_empty() {
            return None;
        }
        let next = self.assigned.len();
        let index = *self.assigned.entry(group.to_string()).or_insert(next);
        Some(self.colors[index % self.colors.len()].clone())
    }

    /// Number of labels seen so far
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    /// Forget every assignment
    pub fn reset(&mut self) {
        self.assigned.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colors_are_stable_in_first_seen_order() {
        let mut palette = GroupPalette::new();
        let b = palette.color_for("B");
        let a = palette.color_for("A");
        assert_eq!(b.as_deref(), Some(DEFAULT_COLORS[0]));
        assert_eq!(a.as_deref(), Some(DEFAULT_COLORS[1]));
        assert_eq!(palette.color_for("B"), b);
        assert_eq!(palette.len(), 2);
    }

    #[test]
    fn test_palette_wraps_around() {
        let mut palette = GroupPalette::with_colors(vec!["red".into(), "blue".into()]);
        palette.color_for("A");
        palette.color_for("B");
        assert_eq!(palette.color_for("C").as_deref(), Some("red"));
    }

    #[test]
    fn test_ungrouped_has_no_color() {
        let mut palette = GroupPalette::new();
        assert_eq!(palette.color_for(""), None);
        assert!(palette.is_empty());
    }
}
