use std::fmt;

/// Target of a registry setter: one index, or every registered entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selection {
    All,
    Index(usize),
}

impl Selection {
    /// Decodes host indices, where any negative value means every entry.
    pub fn from_index(index: i64) -> Self {
        usize::try_from(index).map_or(Selection::All, Selection::Index)
    }
}

impl From<usize> for Selection {
    fn from(index: usize) -> Self {
        Selection::Index(index)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => f.write_str("all"),
            Selection::Index(i) => write!(f, "n°{i}"),
        }
    }
}
