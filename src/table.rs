use crate::{
    models::{Listing, PricePoint},
    utils::{format_large_number, format_percent, format_price},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Plain-text table for terminal output.
pub struct Table {
    headers: Vec<String>,
    align: Vec<Align>,
    rows: Vec<Vec<String>>,
    col_widths: Vec<usize>,
}

impl Table {
    pub fn new(columns: &[(&str, Align)]) -> Self {
        Table {
            headers: columns.iter().map(|(h, _)| h.to_string()).collect(),
            align: columns.iter().map(|(_, a)| *a).collect(),
            rows: Vec::new(),
            col_widths: columns.iter().map(|(h, _)| h.chars().count()).collect(),
        }
    }

    /// Cells past the header count are dropped.
    pub fn add_row(&mut self, row: Vec<String>) {
        let mut row = row;
        row.truncate(self.headers.len());
        for (i, col) in row.iter().enumerate() {
            self.col_widths[i] = self.col_widths[i].max(col.chars().count());
        }
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let mut output = String::new();
        output.push_str(&self.render_row(&self.headers));
        output.push('\n');
        output.push_str(&self.render_separator());
        output.push('\n');
        for row in &self.rows {
            output.push_str(&self.render_row(row));
            output.push('\n');
        }
        output
    }

    fn render_row(&self, row: &[String]) -> String {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let width = self.col_widths[i];
                match self.align[i] {
                    Align::Left => format!("{col:<width$}"),
                    Align::Right => format!("{col:>width$}"),
                }
            })
            .collect();
        cells.join(" | ").trim_end().to_string()
    }

    fn render_separator(&self) -> String {
        self.col_widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    }
}

pub fn listings_table(rows: &[Listing]) -> Table {
    let mut t = Table::new(&[
        ("#", Align::Right),
        ("Name", Align::Left),
        ("Symbol", Align::Left),
        ("Price", Align::Right),
        ("Market Cap", Align::Right),
        ("Volume 24h", Align::Right),
        ("1h", Align::Right),
        ("24h", Align::Right),
        ("7d", Align::Right),
    ]);
    for r in rows {
        t.add_row(vec![
            r.rank.map(|x| x.to_string()).unwrap_or_else(|| "--".into()),
            r.name.clone(),
            r.symbol.clone(),
            format_price(r.current_price),
            format_large_number(r.market_cap, 2),
            format_large_number(r.volume_24h, 2),
            format_percent(r.percent_change_1h, true),
            format_percent(r.percent_change_24h, true),
            format_percent(r.percent_change_7d, true),
        ]);
    }
    t
}

pub fn history_table(points: &[PricePoint]) -> Table {
    let mut t = Table::new(&[
        ("Date (UTC)", Align::Left),
        ("Price", Align::Right),
        ("Market Cap", Align::Right),
        ("Volume 24h", Align::Right),
    ]);
    for p in points {
        t.add_row(vec![
            p.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            format_price(p.price),
            format_large_number(p.market_cap, 2),
            format_large_number(p.volume_24h, 2),
        ]);
    }
    t
}
