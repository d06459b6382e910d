use std::fmt::{self, Display, Write};

const MAX_CELL_WIDTH: usize = 32;

fn trim_if_too_long(value: &str, len: usize) -> String {
    if value.chars().count() > len && len > 3 {
        let mut s: String = value.chars().take(len - 3).collect();
        s.push_str("...");
        s
    } else {
        value.to_string()
    }
}

/// ASCII table used by the CLI to print records.
#[derive(Debug, Default)]
pub struct DebugTable {
    column_names: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl DebugTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn add_column(&mut self, name: impl Display) {
        self.column_names.push(name.to_string());
    }

    /// Adds row. Missing cells are left blank and extra cells are dropped.
    pub fn insert_row<T: Display>(&mut self, row: impl IntoIterator<Item = T>) {
        let mut row: Vec<String> = row.into_iter().map(|cell| cell.to_string()).collect();
        row.resize(self.column_names.len(), String::new());
        self.rows.push(row);
    }

    fn columns_width(&self) -> Vec<usize> {
        (0..self.column_names.len())
            .map(|i| {
                let widest = self
                    .rows
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(self.column_names[i].chars().count()))
                    .max()
                    .unwrap_or(0);
                widest.min(MAX_CELL_WIDTH)
            })
            .collect()
    }

    fn separator(widths: &[usize]) -> String {
        let mut separator = String::from("+");
        for len in widths {
            separator.push_str(&"-".repeat(len + 2));
            separator.push('+');
        }
        separator
    }

    fn printable_row(widths: &[usize], row: &[String]) -> String {
        let mut print_row = String::from("|");
        for (cell, &l) in row.iter().zip(widths) {
            let cell = trim_if_too_long(cell, l);
            print_row.push_str(&format!(" {:^l$} ", cell));
            print_row.push('|');
        }
        print_row
    }
}

impl Display for DebugTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.columns_width();
        let separator = Self::separator(&widths);

        f.write_str(&separator)?;
        f.write_char('\n')?;
        f.write_str(&Self::printable_row(&widths, &self.column_names))?;
        f.write_char('\n')?;
        f.write_str(&separator)?;
        f.write_char('\n')?;

        for row in &self.rows {
            f.write_str(&Self::printable_row(&widths, row))?;
            f.write_char('\n')?;
        }

        if !self.rows.is_empty() {
            f.write_str(&separator)?;
            f.write_char('\n')?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_table() -> anyhow::Result<()> {
        let mut dbg_table = DebugTable::new();

        dbg_table.add_column("id");
        dbg_table.add_column("name");

        dbg_table.insert_row(["1", "ferris"]);
        dbg_table.insert_row(["123456789", "a"]);

        let printed = dbg_table.to_string();
        let lines: Vec<_> = printed.lines().collect();

        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "+-----------+--------+");
        assert!(lines[1].contains("name"));
        assert!(lines[3].contains("ferris"));

        Ok(())
    }

    #[test]
    fn test_long_cells_are_trimmed() -> anyhow::Result<()> {
        let mut dbg_table = DebugTable::new();
        dbg_table.add_column("text");
        dbg_table.insert_row(["x".repeat(100)]);

        assert!(dbg_table.to_string().contains("..."));

        Ok(())
    }
}
