//! Plain-text export of the visible (topmost) strikes

use crate::grid::Grid;
use crate::page::Page;

/// One line per occupied row, gaps as spaces, trailing blanks trimmed
pub fn grid_text(grid: &Grid) -> Vec<String> {
    grid.rows()
        .map(|(_, cells)| {
            let mut line = String::new();
            let mut next_col: Option<i32> = None;
            for (&col, stack) in cells {
                if let Some(next) = next_col {
                    line.push_str(&" ".repeat((col - next).max(0) as usize));
                }
                if let Some(glyph) = stack.last() {
                    line.push(glyph.ch);
                }
                next_col = Some(col + 1);
            }
            line.truncate(line.trim_end().len());
            line
        })
        .collect()
}

/// Every page's lines, with a blank line between pages
pub fn export_text(pages: &[Page]) -> String {
    pages
        .iter()
        .map(|page| grid_text(&page.grid).join("\n"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::Mu;
    use crate::grid::Ink;

    #[test]
    fn test_topmost_layer_and_gaps() {
        let mut page = Page::new(0);
        page.grid.write_run(Mu(16), 4, "cat", Ink::Black);
        page.grid.overtype(Mu(16), 5, 'u', Ink::Red);
        page.grid.overtype(Mu(16), 9, 's', Ink::Black);
        page.grid.overtype(Mu(8), 2, 'x', Ink::Black);
        assert_eq!(grid_text(&page.grid), vec!["x", "cut  s"]);
    }

    #[test]
    fn test_whitespace_strikes_are_trimmed() {
        let mut page = Page::new(0);
        page.grid.write_run(Mu(8), 0, "ab  ", Ink::Black);
        assert_eq!(grid_text(&page.grid), vec!["ab"]);
    }

    #[test]
    fn test_pages_separated_by_blank_line() {
        let mut first = Page::new(0);
        first.grid.write_run(Mu(8), 0, "one", Ink::Black);
        let mut second = Page::new(1);
        second.grid.write_run(Mu(8), 0, "two", Ink::Black);
        assert_eq!(export_text(&[first, second]), "one\n\ntwo");
        assert_eq!(export_text(&[Page::new(0)]), "");
    }
}
