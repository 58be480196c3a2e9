use proptest::prelude::*;
use typewriter_page::bounds::Bounds;
use typewriter_page::grid::{Glyph, Grid, Ink};
use typewriter_page::page::Page;
use typewriter_page::reflow::{linearize, rebuild, Carriage};
use typewriter_page::{GridPos, Mu};

const STEP: Mu = Mu(8);

fn bounds(left: i32, right: i32) -> Bounds {
    Bounds {
        left,
        right,
        top: Mu(16),
        bottom: Mu(72),
    }
}

/// Type `text` the way the keyboard path does; `/` overtypes the previous cell
fn type_into(pages: &mut Vec<Page>, bounds: Bounds, text: &str, word_wrap: bool) -> GridPos {
    let mut carriage = Carriage::new(pages, bounds, STEP, word_wrap, bounds.origin(0));
    for ch in text.chars() {
        match ch {
            ' ' => carriage.space(),
            '\n' => carriage.newline(),
            '/' if carriage.pos.col > bounds.left => {
                carriage.pos.col -= 1;
                carriage.strike(vec![Glyph::new('/', Ink::Red)]);
            }
            _ => {
                carriage.strike(vec![Glyph::new(ch, Ink::Black)]);
            }
        }
    }
    carriage.pos
}

fn grids(pages: &[Page]) -> Vec<Grid> {
    pages.iter().map(|p| p.grid.clone()).collect()
}

fn clear(pages: &mut [Page]) {
    for page in pages {
        page.grid.clear();
    }
}

fn document_text() -> impl Strategy<Value = String> {
    "[a-e /\n]{0,200}"
}

proptest! {
    #[test]
    fn rebuild_of_linearize_is_identity(text in document_text(), word_wrap in any::<bool>()) {
        let b = bounds(3, 14);
        let mut pages = vec![Page::new(0)];
        let caret = type_into(&mut pages, b, &text, word_wrap);
        let before = grids(&pages);

        let linear = linearize(&pages, &b, STEP, caret);
        clear(&mut pages);
        let rebuilt = rebuild(&mut pages, &linear, b, STEP, word_wrap);

        prop_assert_eq!(grids(&pages), before);
        prop_assert_eq!(rebuilt.caret, caret);
    }

    #[test]
    fn caret_offset_survives_rewrap(
        text in document_text(),
        right in 6..20i32,
        caret_cells in 0usize..120,
    ) {
        let old = bounds(3, 14);
        let mut pages = vec![Page::new(0)];
        type_into(&mut pages, old, &text, true);

        // Park the caret in front of some cell
        let cells: Vec<GridPos> = pages
            .iter()
            .flat_map(|p| p.grid.rows().flat_map(move |(row, cells)| {
                cells.keys().map(move |col| GridPos::new(p.index, row, *col))
            }))
            .collect();
        let caret = cells.get(caret_cells).copied().unwrap_or(old.origin(0));

        let linear = linearize(&pages, &old, STEP, caret);
        let cells_before = linear.cells_before_caret();

        let new = bounds(3, right);
        clear(&mut pages);
        let rebuilt = rebuild(&mut pages, &linear, new, STEP, true);
        let again = linearize(&pages, &new, STEP, rebuilt.caret);

        prop_assert_eq!(again.cells_before_caret(), cells_before);
        let count = |pages: &[Page]| pages.iter().map(|p| p.grid.layer_count()).sum::<usize>();
        prop_assert_eq!(count(&pages), linear.tokens.iter().map(|t| match t {
            typewriter_page::reflow::Token::Cell(stack) => stack.len(),
            _ => 0,
        }).sum::<usize>());
    }
}

#[test]
fn test_rewrap_moves_to_next_page() {
    let old = bounds(3, 30);
    let mut pages = vec![Page::new(0)];
    let text = "one two three four five six seven eight nine ten eleven twelve thirteen";
    let caret = type_into(&mut pages, old, text, true);
    let linear = linearize(&pages, &old, STEP, caret);

    let narrow = bounds(3, 10);
    clear(&mut pages);
    let rebuilt = rebuild(&mut pages, &linear, narrow, STEP, true);

    // Eight lines per page at this height
    assert_eq!(narrow.lines_per_page(STEP), 8);
    assert_eq!(pages.len(), 2);
    assert_eq!(rebuilt.caret.page, 1);
    assert_eq!(rebuilt.caret.col, narrow.left + "thirteen".len() as i32);
}

#[test]
fn test_overtype_history_survives_rewrap() {
    let old = bounds(3, 14);
    let mut pages = vec![Page::new(0)];
    let caret = type_into(&mut pages, old, "abc d/ef", true);
    let linear = linearize(&pages, &old, STEP, caret);

    let narrow = bounds(3, 6);
    clear(&mut pages);
    rebuild(&mut pages, &linear, narrow, STEP, true);

    let grid = &pages[0].grid;
    assert_eq!(
        grid.stack(Mu(24), 3),
        Some(&[Glyph::new('d', Ink::Black), Glyph::new('/', Ink::Red)][..])
    );
}

#[test]
fn test_caret_column_does_not_move_later_rows() {
    let old = bounds(3, 14);
    let narrow = bounds(3, 6);
    let rewrap_with_caret = |caret: GridPos| {
        let mut pages = vec![Page::new(0)];
        type_into(&mut pages, old, "ab\ncd", true);
        let linear = linearize(&pages, &old, STEP, caret);
        clear(&mut pages);
        let rebuilt = rebuild(&mut pages, &linear, narrow, STEP, true);
        let rows: Vec<Mu> = pages[0].grid.rows().map(|(row, _)| row).collect();
        (rows, rebuilt.caret)
    };

    let (home_rows, _) = rewrap_with_caret(GridPos::new(0, Mu(16), 3));
    let (far_rows, far_caret) = rewrap_with_caret(GridPos::new(0, Mu(16), 15));
    assert_eq!(home_rows, vec![Mu(16), Mu(24)]);
    assert_eq!(far_rows, home_rows);
    // Parked past the new right bound, the caret waits at the wrap column
    assert_eq!(far_caret, GridPos::new(0, Mu(16), 7));
}
