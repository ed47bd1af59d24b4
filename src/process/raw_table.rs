/// A delimited artifact read back into memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    /// Column names from the header row, in file order.
    pub headers: Vec<String>,
    /// Data rows, one cell per header. Empty cells are `None`.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Keep only the columns at `keep`, in that order.
    pub fn select(&self, keep: &[usize]) -> RawTable {
        RawTable {
            headers: keep.iter().map(|&i| self.headers[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| keep.iter().map(|&i| row.get(i).cloned().flatten()).collect())
                .collect(),
        }
    }
}
