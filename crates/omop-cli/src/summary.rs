use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::types::ConvertResult;

pub fn print_summary(result: &ConvertResult) {
    println!("Documents: {}", result.documents);
    if !result.failed.is_empty() {
        println!("Failed: {}", result.failed.join(", "));
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Rows"),
        header_cell("Unresolved fields"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    let mut total_rows = 0_usize;
    for (name, tally) in &result.tables {
        total_rows += tally.rows;
        let fields = if tally.error_fields.is_empty() {
            Cell::new("-")
        } else {
            Cell::new(
                tally
                    .error_fields
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            )
            .fg(Color::Yellow)
        };
        table.add_row(vec![Cell::new(name), Cell::new(tally.rows), fields]);
    }
    table.add_row(vec![
        Cell::new("TOTAL").fg(Color::Cyan),
        Cell::new(total_rows),
        Cell::new(""),
    ]);
    println!("{table}");
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text).add_attribute(comfy_table::Attribute::Bold)
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}
