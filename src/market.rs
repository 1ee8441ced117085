use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::models::{ChangeWindow, Listing};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub window: ChangeWindow,
    pub percent_change: f64,
    pub current_price: Option<f64>,
}

/// Share of the batch's total market cap, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketShare {
    pub bitcoin: f64,
    pub ethereum: f64,
    pub altcoins: f64,
}

/// Top `n` gainers (descending) and losers (ascending) over `window`.
///
/// Rows without a value for the window are ignored. When fewer than `2n`
/// rows remain, `n` shrinks to half of what is left so the two lists never
/// overlap.
pub fn top_gainers_losers(rows: &[Listing], n: usize, window: ChangeWindow) -> (Vec<Mover>, Vec<Mover>) {
    let mut valid: Vec<Mover> = rows
        .iter()
        .filter_map(|r| {
            let pct = r.percent_change(window).filter(|p| p.is_finite())?;
            Some(Mover {
                id: r.id.clone(),
                name: r.name.clone(),
                symbol: r.symbol.clone(),
                window,
                percent_change: pct,
                current_price: r.current_price,
            })
        })
        .collect();

    let n = if valid.len() < n * 2 { valid.len() / 2 } else { n };

    // stable: ties keep upstream order
    valid.sort_by(|a, b| {
        b.percent_change
            .partial_cmp(&a.percent_change)
            .unwrap_or(Ordering::Equal)
    });
    let gainers = valid.iter().take(n).cloned().collect::<Vec<_>>();

    valid.sort_by(|a, b| {
        a.percent_change
            .partial_cmp(&b.percent_change)
            .unwrap_or(Ordering::Equal)
    });
    let losers = valid.into_iter().take(n).collect::<Vec<_>>();

    (gainers, losers)
}

pub fn market_share(rows: &[Listing]) -> MarketShare {
    let cap = |r: &Listing| r.market_cap.filter(|c| c.is_finite()).unwrap_or(0.0);
    let total: f64 = rows.iter().map(cap).sum();
    if !(total > 0.0) {
        return MarketShare::default();
    }
    let by_symbol = |sym: &str| -> f64 {
        rows.iter()
            .filter(|r| r.symbol.eq_ignore_ascii_case(sym))
            .map(cap)
            .sum()
    };
    let btc = by_symbol("BTC");
    let eth = by_symbol("ETH");
    MarketShare {
        bitcoin: btc / total * 100.0,
        ethereum: eth / total * 100.0,
        altcoins: (total - btc - eth) / total * 100.0,
    }
}

/// Coins pre-selected for comparison, matched by display name.
pub const DEFAULT_COMPARISON: [&str; 5] = ["Bitcoin", "Ethereum", "Solana", "Ripple", "Cardano"];

/// One bar of the market-cap comparison panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapBar {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub market_cap: f64,
    /// Market cap in billions, e.g. `$1260.00B`.
    pub label: String,
}

/// Ids of the default comparison coins present in the batch, in batch order.
pub fn default_selection(rows: &[Listing]) -> Vec<String> {
    rows.iter()
        .filter(|r| DEFAULT_COMPARISON.contains(&r.name.as_str()))
        .map(|r| r.id.clone())
        .collect()
}

/// Market caps of the selected rows, largest first. Rows without a cap are left out.
pub fn market_cap_comparison(rows: &[Listing], ids: &[String]) -> Vec<CapBar> {
    let mut bars: Vec<CapBar> = rows
        .iter()
        .filter(|r| ids.iter().any(|id| id == &r.id))
        .filter_map(|r| {
            let cap = r.market_cap.filter(|c| c.is_finite())?;
            Some(CapBar {
                id: r.id.clone(),
                name: r.name.clone(),
                symbol: r.symbol.clone(),
                market_cap: cap,
                label: format!("${:.2}B", cap / 1e9),
            })
        })
        .collect();
    bars.sort_by(|a, b| b.market_cap.partial_cmp(&a.market_cap).unwrap_or(Ordering::Equal));
    bars
}

/// Rows whose id is in `ids`, keeping the batch order. Empty `ids` keeps everything.
pub fn select<'a>(rows: &'a [Listing], ids: &[String]) -> Vec<&'a Listing> {
    if ids.is_empty() {
        return rows.iter().collect();
    }
    rows.iter().filter(|r| ids.iter().any(|id| id == &r.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, symbol: &str, cap: Option<f64>, pct_24h: Option<f64>) -> Listing {
        Listing {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: id.to_string(),
            image: None,
            rank: None,
            current_price: Some(1.0),
            market_cap: cap,
            volume_24h: None,
            percent_change_1h: None,
            percent_change_24h: pct_24h,
            percent_change_7d: None,
            percent_change_30d: None,
            last_updated: None,
        }
    }

    #[test]
    fn gainers_and_losers_are_ranked() {
        let rows: Vec<Listing> = [5.0, -3.0, 12.0, 0.0, -8.0, 1.0, -1.0, 7.0, -2.0, 3.0, 2.5, -0.5]
            .iter()
            .enumerate()
            .map(|(i, p)| row(&format!("c{i}"), "X", Some(1.0), Some(*p)))
            .collect();

        let (g, l) = top_gainers_losers(&rows, 5, ChangeWindow::H24);
        let gp: Vec<f64> = g.iter().map(|m| m.percent_change).collect();
        let lp: Vec<f64> = l.iter().map(|m| m.percent_change).collect();
        assert_eq!(gp, [12.0, 7.0, 5.0, 3.0, 2.5]);
        assert_eq!(lp, [-8.0, -3.0, -2.0, -1.0, -0.5]);
        assert!(g.iter().all(|m| m.window == ChangeWindow::H24));
    }

    #[test]
    fn short_batches_shrink_n_and_skip_missing() {
        let rows = vec![
            row("a", "A", None, Some(4.0)),
            row("b", "B", None, None),
            row("c", "C", None, Some(-4.0)),
            row("d", "D", None, Some(1.0)),
        ];
        let (g, l) = top_gainers_losers(&rows, 5, ChangeWindow::H24);
        assert_eq!(g.len(), 1);
        assert_eq!(l.len(), 1);
        assert_eq!(g[0].id, "a");
        assert_eq!(l[0].id, "c");

        let (g, l) = top_gainers_losers(&rows, 5, ChangeWindow::D7);
        assert!(g.is_empty() && l.is_empty());
    }

    #[test]
    fn market_share_splits_btc_eth_and_rest() {
        let rows = vec![
            row("bitcoin", "BTC", Some(500.0), None),
            row("ethereum", "ETH", Some(250.0), None),
            row("solana", "SOL", Some(200.0), None),
            row("dogecoin", "DOGE", Some(50.0), None),
            row("mystery", "MYS", None, None),
        ];
        let s = market_share(&rows);
        assert!((s.bitcoin - 50.0).abs() < 1e-9);
        assert!((s.ethereum - 25.0).abs() < 1e-9);
        assert!((s.altcoins - 25.0).abs() < 1e-9);
    }

    #[test]
    fn market_share_of_empty_batch_is_zero() {
        assert_eq!(market_share(&[]), MarketShare::default());
        assert_eq!(market_share(&[row("x", "X", None, None)]), MarketShare::default());
    }

    #[test]
    fn default_selection_uses_known_names_in_batch_order() {
        let mut rows = vec![
            row("solana", "SOL", Some(8.0e10), None),
            row("bitcoin", "BTC", Some(1.2e12), None),
            row("dogecoin", "DOGE", Some(2.0e10), None),
        ];
        rows[0].name = "Solana".into();
        rows[1].name = "Bitcoin".into();
        rows[2].name = "Dogecoin".into();
        assert_eq!(default_selection(&rows), ["solana", "bitcoin"]);
        assert!(default_selection(&rows[2..]).is_empty());
    }

    #[test]
    fn cap_comparison_sorts_largest_first_and_skips_missing_caps() {
        let rows = vec![
            row("solana", "SOL", Some(8.0e10), None),
            row("bitcoin", "BTC", Some(1.26e12), None),
            row("mystery", "MYS", None, None),
            row("dogecoin", "DOGE", Some(2.2e10), None),
        ];
        let ids: Vec<String> = ["solana", "bitcoin", "mystery"].iter().map(|s| s.to_string()).collect();
        let bars = market_cap_comparison(&rows, &ids);
        let got: Vec<(&str, &str)> = bars.iter().map(|b| (b.id.as_str(), b.label.as_str())).collect();
        assert_eq!(got, [("bitcoin", "$1260.00B"), ("solana", "$80.00B")]);
    }

    #[test]
    fn select_keeps_batch_order() {
        let rows = vec![row("a", "A", None, None), row("b", "B", None, None), row("c", "C", None, None)];
        let picked = select(&rows, &["c".to_string(), "a".to_string()]);
        let ids: Vec<&str> = picked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(select(&rows, &[]).len(), 3);
    }
}
