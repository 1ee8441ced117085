use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    coingecko::{CoinGeckoClient, FetchError, ListingsQuery, MAX_HISTORY_DAYS},
    config::Settings,
    market::{
        default_selection, market_cap_comparison, market_share, select, top_gainers_losers, CapBar,
        MarketShare, Mover,
    },
    models::{ChangeWindow, Listing, PricePoint},
    utils::{
        format_large_number, format_percent, format_price, listings_csv, now_ts, percent_color,
        ATTRIBUTION, ATTRIBUTION_URL,
    },
};

const MOVERS_PER_SIDE: usize = 5;

#[derive(Clone)]
pub struct DashboardState {
    pub settings: Settings,
    pub client: CoinGeckoClient,
}

/// One display-ready line of the listings table.
#[derive(Debug, Clone, Serialize)]
pub struct TableRow {
    pub rank: String,
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub image: Option<String>,
    pub price: String,
    pub market_cap: String,
    pub volume_24h: String,
    pub change_1h: String,
    pub change_24h: String,
    pub change_7d: String,
    pub change_30d: String,
    pub change_24h_color: &'static str,
}

pub fn table_rows(rows: &[Listing]) -> Vec<TableRow> {
    rows.iter()
        .map(|r| TableRow {
            rank: r.rank.map(|x| x.to_string()).unwrap_or_else(|| "--".into()),
            id: r.id.clone(),
            name: r.name.clone(),
            symbol: r.symbol.clone(),
            image: r.image.clone(),
            price: format_price(r.current_price),
            market_cap: format_large_number(r.market_cap, 2),
            volume_24h: format_large_number(r.volume_24h, 2),
            change_1h: format_percent(r.percent_change_1h, true),
            change_24h: format_percent(r.percent_change_24h, true),
            change_7d: format_percent(r.percent_change_7d, true),
            change_30d: format_percent(r.percent_change_30d, true),
            change_24h_color: percent_color(r.percent_change_24h),
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct ListingsView {
    pub ts: f64,
    pub attribution: &'static str,
    pub vs_currency: String,
    pub rows: Vec<TableRow>,
    pub listings: Vec<Listing>,
    pub gainers: Vec<Mover>,
    pub losers: Vec<Mover>,
    pub market_share: MarketShare,
    /// Ids picked for comparison, in listing order.
    pub selected: Vec<String>,
    pub comparison: Vec<CapBar>,
}

impl ListingsView {
    /// `ids` empty means the default comparison set.
    pub fn build(vs_currency: &str, listings: Vec<Listing>, ids: &[String]) -> Self {
        let (gainers, losers) = top_gainers_losers(&listings, MOVERS_PER_SIDE, ChangeWindow::H24);
        let selected: Vec<String> = if ids.is_empty() {
            default_selection(&listings)
        } else {
            select(&listings, ids).into_iter().map(|r| r.id.clone()).collect()
        };
        Self {
            ts: now_ts(),
            attribution: ATTRIBUTION,
            vs_currency: vs_currency.to_string(),
            rows: table_rows(&listings),
            market_share: market_share(&listings),
            comparison: market_cap_comparison(&listings, &selected),
            selected,
            gainers,
            losers,
            listings,
        }
    }
}

/// Computed over the non-null prices only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistorySummary {
    pub first: f64,
    pub last: f64,
    pub min: f64,
    pub max: f64,
    pub change_pct: Option<f64>,
}

impl HistorySummary {
    pub fn of(points: &[PricePoint]) -> Option<Self> {
        let mut prices = points.iter().filter_map(|p| p.price);
        let first = prices.next()?;
        let (last, min, max) = prices.fold((first, first, first), |(_, lo, hi), p| {
            (p, lo.min(p), hi.max(p))
        });
        let change_pct = (first != 0.0).then(|| (last - first) / first * 100.0);
        Some(Self {
            first,
            last,
            min,
            max,
            change_pct,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryView {
    pub ts: f64,
    pub attribution: &'static str,
    pub coin: String,
    pub days: i64,
    pub summary: Option<HistorySummary>,
    pub points: Vec<PricePoint>,
}

pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(Any);

    let api = Router::new()
        .route("/api/health", get(api_health))
        .route("/api/listings", get(api_listings))
        .route("/api/listings.csv", get(api_listings_csv))
        .route("/api/history", get(api_history))
        .layer(cors);

    Router::new()
        .route("/", get(index))
        .merge(api)
        .with_state(state)
}

pub async fn serve_dashboard(settings: Settings, client: CoinGeckoClient) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.dashboard_host, settings.dashboard_port)
        .parse()
        .with_context(|| {
            format!(
                "dashboard addr {}:{}",
                settings.dashboard_host, settings.dashboard_port
            )
        })?;

    let app = router(DashboardState { settings, client });

    log::info!("dashboard.start url=http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let signal = tokio::signal::ctrl_c().await;
            log_shutdown(&signal);
        })
        .await?;
    Ok(())
}

/// A failed signal handler still stops the server, but never silently.
fn log_shutdown(signal: &std::io::Result<()>) -> log::Level {
    match signal {
        Ok(()) => {
            log::info!("dashboard.stop signal=ctrl_c");
            log::Level::Info
        }
        Err(e) => {
            log::error!("dashboard.stop signal_handler_failed err={}", e);
            log::Level::Error
        }
    }
}

fn fetch_error_response(what: &str, e: &FetchError) -> Response {
    let status = match e {
        e if e.is_rejected() => StatusCode::BAD_REQUEST,
        FetchError::UnknownSymbol(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    };
    log::warn!("dashboard.{}.error status={} {}", what, status.as_u16(), e);
    (
        status,
        Json(serde_json::json!({ "ok": false, "error": e.to_string() })),
    )
        .into_response()
}

async fn index(State(st): State<DashboardState>) -> impl IntoResponse {
    Html(render_index_html(&st.settings))
}

async fn api_health(State(st): State<DashboardState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "ts": now_ts(),
        "upstream_base_url": st.client.base_url(),
    }))
}

async fn api_listings(State(st): State<DashboardState>, Query(q): Query<IdsQ>) -> Response {
    let ids = split_ids(q.ids.as_deref());
    let query = ListingsQuery::from_settings(&st.settings);
    match st.client.fetch_listings(&query).await {
        Ok(rows) => Json(ListingsView::build(&query.vs_currency, rows, &ids)).into_response(),
        Err(e) => fetch_error_response("listings", &e),
    }
}

#[derive(Deserialize)]
struct IdsQ {
    ids: Option<String>,
}

fn split_ids(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

async fn api_listings_csv(State(st): State<DashboardState>, Query(q): Query<IdsQ>) -> Response {
    let ids = split_ids(q.ids.as_deref());
    let query = ListingsQuery::from_settings(&st.settings);
    match st.client.fetch_listings(&query).await {
        Ok(rows) => {
            let picked = select(&rows, &ids);
            let body = match listings_csv(picked.iter().copied()) {
                Ok(b) => b,
                Err(e) => {
                    log::error!("dashboard.csv.error {:#}", e);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(serde_json::json!({ "ok": false, "error": format!("{e:#}") })),
                    )
                        .into_response();
                }
            };
            let filename = format!(
                "crypto_data_{}.csv",
                chrono::Utc::now().format("%Y%m%d_%H%M%S")
            );
            log::info!("dashboard.csv rows={} file={}", picked.len(), filename);
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{filename}\""),
                    ),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => fetch_error_response("csv", &e),
    }
}

#[derive(Deserialize)]
struct HistoryQ {
    coin: Option<String>,
    days: Option<String>,
}

fn parse_days(raw: Option<&str>, default: u32) -> Result<i64, FetchError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(i64::from(default)),
        Some(s) => s
            .parse::<i64>()
            .map_err(|_| FetchError::InvalidQuery(format!("days must be an integer (got {s:?})"))),
    }
}

async fn api_history(State(st): State<DashboardState>, Query(q): Query<HistoryQ>) -> Response {
    let days = match parse_days(q.days.as_deref(), st.settings.default_history_days) {
        Ok(d) => d,
        Err(e) => return fetch_error_response("history", &e),
    };
    let coin = q.coin.unwrap_or_default();
    match st.client.fetch_history(&coin, days).await {
        Ok(points) => Json(HistoryView {
            ts: now_ts(),
            attribution: ATTRIBUTION,
            coin: coin.trim().to_string(),
            days,
            summary: HistorySummary::of(&points),
            points,
        })
        .into_response(),
        Err(e) => fetch_error_response("history", &e),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

fn render_index_html(settings: &Settings) -> String {
    // Single-file UI, no build step. All data comes from /api/* on user action.
    format!(
        r##"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>coindash • Crypto Market Dashboard</title>
    <style>
      :root {{
        --bg: #0b1220;
        --panel: rgba(255,255,255,0.06);
        --stroke: rgba(255,255,255,0.12);
        --text: rgba(255,255,255,0.92);
        --muted: rgba(255,255,255,0.65);
        --good: #10B981;
        --bad: #EF4444;
        --flat: #94A3B8;
        --brand: #7c5cff;
        --brand2: #3dd6d0;
      }}
      * {{ box-sizing: border-box; }}
      body {{
        margin: 0;
        font-family: ui-sans-serif, system-ui, -apple-system, Segoe UI, Roboto, Helvetica, Arial;
        color: var(--text);
        background: radial-gradient(1200px 900px at 15% 10%, rgba(124,92,255,0.20), transparent 60%),
                    radial-gradient(1100px 800px at 90% 20%, rgba(61,214,208,0.16), transparent 55%),
                    var(--bg);
      }}
      a {{ color: var(--brand2); }}
      .wrap {{ max-width: 1280px; margin: 0 auto; padding: 22px 18px 42px; }}
      .topbar {{
        display: flex; align-items: center; justify-content: space-between; gap: 12px;
        padding: 16px; border: 1px solid var(--stroke); border-radius: 16px;
        background: linear-gradient(180deg, rgba(255,255,255,0.06), rgba(255,255,255,0.03));
      }}
      .brand {{ display: flex; align-items: center; gap: 12px; }}
      .logo {{
        width: 42px; height: 42px; border-radius: 12px;
        background: conic-gradient(from 180deg, var(--brand), var(--brand2), var(--brand));
      }}
      .title {{ font-weight: 800; letter-spacing: 0.2px; }}
      .subtitle {{ color: var(--muted); font-size: 12px; margin-top: 2px; }}
      .chips {{ display: flex; flex-wrap: wrap; gap: 8px; justify-content: flex-end; align-items: center; }}
      .chip {{
        padding: 7px 10px; border-radius: 999px; border: 1px solid var(--stroke);
        background: rgba(255,255,255,0.04); font-size: 12px; color: var(--muted); white-space: nowrap;
      }}
      .chip b {{ color: var(--text); }}
      .grid {{ display: grid; gap: 14px; margin-top: 14px; grid-template-columns: repeat(12, 1fr); }}
      .card {{ border: 1px solid var(--stroke); border-radius: 16px; background: var(--panel); overflow: hidden; }}
      .card .hd {{
        display: flex; align-items: center; justify-content: space-between; gap: 10px;
        padding: 12px 14px; border-bottom: 1px solid rgba(255,255,255,0.08); background: rgba(255,255,255,0.03);
      }}
      .card .hd .h {{ font-weight: 800; }}
      .pill {{ font-size: 12px; color: var(--muted); border: 1px solid var(--stroke); padding: 3px 8px; border-radius: 999px; }}
      .card .bd {{ padding: 12px 14px; }}
      .kpis {{ display: grid; gap: 10px; grid-template-columns: repeat(5, 1fr); }}
      .kpi {{ border: 1px solid rgba(255,255,255,0.10); border-radius: 14px; padding: 12px; background: rgba(255,255,255,0.04); }}
      .kpi .lbl {{ color: var(--muted); font-size: 12px; }}
      .kpi .val {{ font-size: 22px; font-weight: 850; margin-top: 6px; }}
      .kpi .sub {{ font-size: 12px; color: var(--muted); margin-top: 4px; }}
      .kpi .coin {{ display: flex; align-items: center; gap: 8px; font-weight: 800; }}
      .kpi .coin img {{ width: 22px; height: 22px; border-radius: 50%; }}
      .good {{ color: var(--good); }}
      .bad {{ color: var(--bad); }}
      table {{ width: 100%; border-collapse: collapse; }}
      th, td {{ padding: 9px 10px; border-bottom: 1px solid rgba(255,255,255,0.07); text-align: left; }}
      th {{ color: var(--muted); font-size: 12px; font-weight: 700; }}
      td {{ font-size: 13px; }}
      td.num, th.num {{ text-align: right; font-variant-numeric: tabular-nums; }}
      tr.sel td {{ background: rgba(124,92,255,0.12); }}
      tbody tr {{ cursor: pointer; }}
      .mono {{ font-family: ui-monospace, SFMono-Regular, Menlo, Monaco, Consolas, monospace; }}
      .btn, select, input {{
        padding: 7px 10px; border-radius: 10px; border: 1px solid rgba(255,255,255,0.12);
        background: rgba(255,255,255,0.05); color: var(--text); font-weight: 700; font-size: 12px;
      }}
      .btn {{ cursor: pointer; text-decoration: none; }}
      .btn:hover {{ background: rgba(255,255,255,0.08); }}
      select option {{ background: var(--bg); }}
      .controls {{ display: flex; flex-wrap: wrap; gap: 8px; align-items: center; }}
      .share-row {{ margin: 8px 0 12px; }}
      .bar-track {{ height: 10px; border-radius: 999px; background: rgba(255,255,255,0.07); overflow: hidden; margin-top: 5px; }}
      .bar {{ height: 100%; width: 0%; background: linear-gradient(90deg, var(--brand), var(--brand2)); }}
      .small {{ font-size: 12px; color: var(--muted); }}
      .banner {{
        margin-top: 12px; padding: 10px 12px; border-radius: 14px;
        border: 1px solid rgba(255,255,255,0.14); background: rgba(239,68,68,0.10); display: none;
      }}
      .banner pre {{ margin: 8px 0 0; white-space: pre-wrap; word-break: break-word; }}
      canvas {{ width: 100%; height: 320px; display: block; }}
      .footer {{ margin-top: 14px; color: var(--muted); font-size: 12px; }}
      .col-12 {{ grid-column: span 12; }}
      .col-8 {{ grid-column: span 8; }}
      .col-6 {{ grid-column: span 6; }}
      .col-4 {{ grid-column: span 4; }}
      @media (max-width: 1100px) {{
        .kpis {{ grid-template-columns: repeat(2, 1fr); }}
        .col-8, .col-6, .col-4 {{ grid-column: span 12; }}
      }}
    </style>
  </head>
  <body>
    <div class="wrap">
      <div class="topbar">
        <div class="brand">
          <div class="logo"></div>
          <div>
            <div class="title">Cryptocurrency Market Dashboard</div>
            <div class="subtitle">
              Upstream: <span class="mono">{base_url}</span> • currency=<b>{vs_currency}</b>
            </div>
          </div>
        </div>
        <div class="chips">
          <div class="chip">Status: <b id="statusText">idle</b></div>
          <div class="chip">Updated: <b id="updatedText">--</b></div>
          <button class="btn" id="refreshBtn">Refresh</button>
        </div>
      </div>

      <div class="banner" id="errBanner">
        <div style="font-weight:850;">Request failed</div>
        <pre class="mono small" id="errBannerDetail"></pre>
      </div>

      <div class="grid">
        <div class="card col-12">
          <div class="hd">
            <div class="h">Compare coins</div>
            <div class="controls">
              <label class="small" for="coinPicker">Coins (ctrl/cmd-click for several)</label>
              <select id="coinPicker" multiple size="5" style="min-width: 220px;"></select>
              <label class="small" for="coinSelect">Chart</label>
              <select id="coinSelect"></select>
              <label class="small" for="daysInput">Days</label>
              <input id="daysInput" type="number" min="1" max="{max_days}" step="1" value="{default_days}" style="width: 80px;" />
              <button class="btn" data-days="7">7d</button>
              <button class="btn" data-days="30">30d</button>
              <button class="btn" data-days="90">90d</button>
              <button class="btn" data-days="180">180d</button>
              <button class="btn" data-days="365">365d</button>
            </div>
          </div>
          <div class="bd">
            <div class="kpis" id="coinCards"></div>
          </div>
        </div>

        <div class="card col-8">
          <div class="hd">
            <div class="h" id="chartTitle">Price history</div>
            <div class="pill" id="chartMeta">--</div>
          </div>
          <div class="bd"><canvas id="priceChart" width="800" height="320"></canvas></div>
        </div>

        <div class="card col-4">
          <div class="hd">
            <div class="h">Market share</div>
            <div class="pill">of listed market cap</div>
          </div>
          <div class="bd" id="shareBox"></div>
        </div>

        <div class="card col-12">
          <div class="hd">
            <div class="h">Market cap comparison</div>
            <div class="pill">selected coins</div>
          </div>
          <div class="bd" id="capBars"></div>
        </div>

        <div class="card col-6">
          <div class="hd"><div class="h">Top gainers (24h)</div></div>
          <div class="bd">
            <table>
              <thead><tr><th>Coin</th><th class="num">Price</th><th class="num">24h</th></tr></thead>
              <tbody id="gainRows"></tbody>
            </table>
          </div>
        </div>

        <div class="card col-6">
          <div class="hd"><div class="h">Top losers (24h)</div></div>
          <div class="bd">
            <table>
              <thead><tr><th>Coin</th><th class="num">Price</th><th class="num">24h</th></tr></thead>
              <tbody id="loseRows"></tbody>
            </table>
          </div>
        </div>

        <div class="card col-12">
          <div class="hd">
            <div class="h">Listings</div>
            <div class="controls">
              <span class="pill" id="listMeta">--</span>
              <a class="btn" id="csvSelected" href="/api/listings.csv">Download selected (CSV)</a>
              <a class="btn" href="/api/listings.csv">Download all (CSV)</a>
            </div>
          </div>
          <div class="bd">
            <table>
              <thead>
                <tr>
                  <th class="num">#</th>
                  <th>Name</th>
                  <th>Symbol</th>
                  <th class="num">Price</th>
                  <th class="num">Market Cap</th>
                  <th class="num">Volume (24h)</th>
                  <th class="num">1h</th>
                  <th class="num">24h</th>
                  <th class="num">7d</th>
                  <th class="num">30d</th>
                </tr>
              </thead>
              <tbody id="listRows"></tbody>
            </table>
          </div>
        </div>
      </div>

      <div class="footer">
        {attribution} • <a href="{attribution_url}" target="_blank" rel="noopener">CoinGecko</a>
      </div>
    </div>

    <script>
      const MAX_DAYS = {max_days};
      let listings = [];
      let selectedIds = [];
      let chartId = null;

      async function getJson(path) {{
        const r = await fetch(path, {{ cache: "no-store" }});
        let body = null;
        try {{ body = await r.json(); }} catch (e) {{}}
        if (!r.ok) {{
          const msg = body && body.error ? body.error : `HTTP ${{r.status}}`;
          throw new Error(`${{path}} -> ${{r.status}}\n${{msg}}`);
        }}
        return body;
      }}

      function escapeHtml(s) {{
        return (s ?? "").toString().replaceAll("&","&amp;").replaceAll("<","&lt;").replaceAll(">","&gt;").replaceAll('"',"&quot;").replaceAll("'","&#039;");
      }}

      function setStatus(ok, msg) {{
        const el = document.getElementById("statusText");
        el.textContent = msg;
        el.className = ok ? "good" : "bad";
      }}
      function showBanner(detail) {{
        document.getElementById("errBannerDetail").textContent = detail || "";
        document.getElementById("errBanner").style.display = "block";
      }}
      function hideBanner() {{
        document.getElementById("errBanner").style.display = "none";
      }}
      const chgClass = (s) => s.startsWith("+") ? "good" : (s.startsWith("-") ? "bad" : "");

      function renderListings(view) {{
        const tb = document.getElementById("listRows");
        tb.innerHTML = "";
        for (const r of view.rows) {{
          const tr = document.createElement("tr");
          if (selectedIds.includes(r.id)) tr.className = "sel";
          tr.innerHTML = `
            <td class="num">${{escapeHtml(r.rank)}}</td>
            <td><b>${{escapeHtml(r.name)}}</b></td>
            <td class="mono">${{escapeHtml(r.symbol)}}</td>
            <td class="num">${{escapeHtml(r.price)}}</td>
            <td class="num">${{escapeHtml(r.market_cap)}}</td>
            <td class="num">${{escapeHtml(r.volume_24h)}}</td>
            <td class="num ${{chgClass(r.change_1h)}}">${{escapeHtml(r.change_1h)}}</td>
            <td class="num" style="color: ${{r.change_24h_color}}">${{escapeHtml(r.change_24h)}}</td>
            <td class="num ${{chgClass(r.change_7d)}}">${{escapeHtml(r.change_7d)}}</td>
            <td class="num ${{chgClass(r.change_30d)}}">${{escapeHtml(r.change_30d)}}</td>
          `;
          tr.addEventListener("click", () => selectCoin(r.id));
          tb.appendChild(tr);
        }}
        document.getElementById("listMeta").textContent = `${{view.rows.length}} coins • ${{view.vs_currency}}`;
      }}

      function renderMovers(id, rows) {{
        const tb = document.getElementById(id);
        tb.innerHTML = "";
        if (!rows.length) {{
          tb.innerHTML = `<tr><td colspan="3" class="small">not enough data</td></tr>`;
          return;
        }}
        for (const m of rows) {{
          const pct = Number(m.percent_change);
          const tr = document.createElement("tr");
          tr.innerHTML = `
            <td><b>${{escapeHtml(m.name)}}</b> <span class="small mono">${{escapeHtml(m.symbol)}}</span></td>
            <td class="num">${{m.current_price == null ? "N/A" : "$" + Number(m.current_price).toFixed(4)}}</td>
            <td class="num ${{pct >= 0 ? "good" : "bad"}}">${{(pct > 0 ? "+" : "") + pct.toFixed(2)}}%</td>
          `;
          tr.addEventListener("click", () => selectCoin(m.id));
          tb.appendChild(tr);
        }}
      }}

      function renderShare(share) {{
        const box = document.getElementById("shareBox");
        box.innerHTML = "";
        for (const [label, v] of [["Bitcoin", share.bitcoin], ["Ethereum", share.ethereum], ["Altcoins", share.altcoins]]) {{
          const pct = Number(v) || 0;
          const row = document.createElement("div");
          row.className = "share-row";
          row.innerHTML = `
            <div class="small">${{label}} <b style="float:right;">${{pct.toFixed(2)}}%</b></div>
            <div class="bar-track"><div class="bar" style="width: ${{Math.max(0, Math.min(100, pct))}}%"></div></div>
          `;
          box.appendChild(row);
        }}
      }}

      function renderSelectors() {{
        const picker = document.getElementById("coinPicker");
        picker.innerHTML = "";
        for (const l of listings) {{
          const o = document.createElement("option");
          o.value = l.id;
          o.textContent = `${{l.name}} (${{l.symbol}})`;
          o.selected = selectedIds.includes(l.id);
          picker.appendChild(o);
        }}
        const sel = document.getElementById("coinSelect");
        sel.innerHTML = "";
        for (const id of selectedIds) {{
          const l = listings.find((x) => x.id === id);
          if (!l) continue;
          const o = document.createElement("option");
          o.value = l.id;
          o.textContent = l.name;
          sel.appendChild(o);
        }}
        if (chartId) sel.value = chartId;
        document.getElementById("csvSelected").href = "/api/listings.csv?ids=" + encodeURIComponent(selectedIds.join(","));
      }}

      function renderCards(view) {{
        const box = document.getElementById("coinCards");
        box.innerHTML = "";
        if (!selectedIds.length) {{
          box.innerHTML = `<div class="small">Pick one or more coins to compare.</div>`;
          return;
        }}
        for (const id of selectedIds) {{
          const i = view.listings.findIndex((l) => l.id === id);
          if (i < 0) continue;
          const row = view.rows[i];
          const card = document.createElement("div");
          card.className = "kpi";
          card.innerHTML = `
            <div class="coin">${{row.image ? `<img src="${{escapeHtml(row.image)}}" alt="" />` : ""}}${{escapeHtml(row.name)}} <span class="small mono">${{escapeHtml(row.symbol)}}</span></div>
            <div class="val">${{escapeHtml(row.price)}}</div>
            <div class="sub" style="color: ${{row.change_24h_color}}">${{escapeHtml(row.change_24h)}} (24h)</div>
            <div class="sub">Market cap <b>${{escapeHtml(row.market_cap)}}</b></div>
            <div class="sub">Volume 24h <b>${{escapeHtml(row.volume_24h)}}</b></div>
          `;
          card.addEventListener("click", () => selectCoin(id));
          box.appendChild(card);
        }}
      }}

      function renderComparison(bars) {{
        const box = document.getElementById("capBars");
        box.innerHTML = "";
        if (!bars.length) {{
          box.innerHTML = `<div class="small">no market cap data for the selection</div>`;
          return;
        }}
        const top = bars[0].market_cap || 1;
        for (const b of bars) {{
          const row = document.createElement("div");
          row.className = "share-row";
          row.innerHTML = `
            <div class="small">${{escapeHtml(b.name)}} <b style="float:right;">${{escapeHtml(b.label)}}</b></div>
            <div class="bar-track"><div class="bar" style="width: ${{Math.max(0, Math.min(100, b.market_cap / top * 100))}}%"></div></div>
          `;
          box.appendChild(row);
        }}
      }}

      function drawChart(points) {{
        const c = document.getElementById("priceChart");
        const dpr = window.devicePixelRatio || 1;
        const w = c.clientWidth || 800, h = c.clientHeight || 320;
        c.width = w * dpr; c.height = h * dpr;
        const g = c.getContext("2d");
        g.setTransform(dpr, 0, 0, dpr, 0, 0);
        g.clearRect(0, 0, w, h);
        g.font = "11px ui-sans-serif, system-ui";
        g.fillStyle = "rgba(255,255,255,0.65)";
        if (!points.length) {{
          g.fillText("no data", w / 2 - 20, h / 2);
          return;
        }}
        const pad = {{ l: 70, r: 12, t: 12, b: 26 }};
        const xs = points.map((p) => Date.parse(p.timestamp));
        const ys = points.map((p) => p.price == null ? null : Number(p.price));
        const known = ys.filter((y) => y != null);
        if (!known.length) {{
          g.fillText("no prices", w / 2 - 24, h / 2);
          return;
        }}
        const x0 = Math.min(...xs), x1 = Math.max(...xs);
        let y0 = Math.min(...known), y1 = Math.max(...known);
        if (y0 === y1) {{ y0 -= 1; y1 += 1; }}
        const px = (x) => pad.l + (x1 === x0 ? 0.5 : (x - x0) / (x1 - x0)) * (w - pad.l - pad.r);
        const py = (y) => pad.t + (1 - (y - y0) / (y1 - y0)) * (h - pad.t - pad.b);

        g.strokeStyle = "rgba(255,255,255,0.08)";
        for (let k = 0; k <= 4; k++) {{
          const y = y0 + (y1 - y0) * k / 4;
          g.beginPath(); g.moveTo(pad.l, py(y)); g.lineTo(w - pad.r, py(y)); g.stroke();
          g.fillText("$" + y.toFixed(y < 10 ? 4 : 2), 4, py(y) + 4);
        }}
        g.fillText(new Date(x0).toLocaleDateString(), pad.l, h - 8);
        const lastLbl = new Date(x1).toLocaleDateString();
        g.fillText(lastLbl, w - pad.r - g.measureText(lastLbl).width, h - 8);

        const grad = g.createLinearGradient(pad.l, 0, w - pad.r, 0);
        grad.addColorStop(0, "#7c5cff");
        grad.addColorStop(1, "#3dd6d0");
        g.strokeStyle = grad;
        g.lineWidth = 2;
        g.beginPath();
        let pen = false;
        points.forEach((p, i) => {{
          if (ys[i] == null) {{ pen = false; return; }}
          const x = px(xs[i]), y = py(ys[i]);
          if (pen) g.lineTo(x, y); else g.moveTo(x, y);
          pen = true;
        }});
        g.stroke();
      }}

      function currentDays() {{
        const el = document.getElementById("daysInput");
        const d = Math.round(Number(el.value));
        if (!Number.isFinite(d) || d < 1 || d > MAX_DAYS) {{
          throw new Error(`days must be between 1 and ${{MAX_DAYS}}`);
        }}
        return d;
      }}

      async function loadHistory() {{
        if (!chartId) return;
        try {{
          const days = currentDays();
          setStatus(true, "loading history…");
          const h = await getJson(`/api/history?coin=${{encodeURIComponent(chartId)}}&days=${{days}}`);
          const l = listings.find((x) => x.id === chartId);
          document.getElementById("chartTitle").textContent = `${{l ? l.name : h.coin}} price (USD)`;
          const s = h.summary;
          document.getElementById("chartMeta").textContent = s && s.change_pct != null
            ? `${{h.days}}d • ${{s.change_pct >= 0 ? "+" : ""}}${{s.change_pct.toFixed(2)}}% • low $${{s.min.toFixed(4)}} • high $${{s.max.toFixed(4)}}`
            : `${{h.days}}d`;
          drawChart(h.points);
          setStatus(true, "ok");
          hideBanner();
        }} catch (e) {{
          setStatus(false, "error");
          showBanner((e && e.message) ? e.message : String(e));
        }}
      }}

      function selectCoin(id) {{
        if (!selectedIds.includes(id)) {{
          selectedIds = [...selectedIds, id];
          chartId = id;
          refresh();
          return;
        }}
        chartId = id;
        document.getElementById("coinSelect").value = id;
        loadHistory();
      }}

      async function refresh() {{
        try {{
          setStatus(true, "loading listings…");
          const q = selectedIds.length ? "?ids=" + encodeURIComponent(selectedIds.join(",")) : "";
          const view = await getJson("/api/listings" + q);
          window.__lastListings = view;
          listings = view.listings;
          selectedIds = view.selected;
          if (!chartId || !selectedIds.includes(chartId)) {{
            chartId = selectedIds.length ? selectedIds[0] : null;
          }}
          renderSelectors();
          renderCards(view);
          renderComparison(view.comparison);
          renderListings(view);
          renderMovers("gainRows", view.gainers);
          renderMovers("loseRows", view.losers);
          renderShare(view.market_share);
          document.getElementById("updatedText").textContent = new Date(view.ts * 1000).toLocaleTimeString();
          setStatus(true, "ok");
          hideBanner();
          await loadHistory();
        }} catch (e) {{
          setStatus(false, "error");
          showBanner((e && e.message) ? e.message : String(e));
        }}
      }}

      document.getElementById("refreshBtn").addEventListener("click", refresh);
      document.getElementById("coinSelect").addEventListener("change", (ev) => selectCoin(ev.target.value));
      document.getElementById("coinPicker").addEventListener("change", (ev) => {{
        selectedIds = [...ev.target.selectedOptions].map((o) => o.value);
        refresh();
      }});
      document.getElementById("daysInput").addEventListener("change", loadHistory);
      for (const b of document.querySelectorAll("button[data-days]")) {{
        b.addEventListener("click", () => {{
          document.getElementById("daysInput").value = b.dataset.days;
          loadHistory();
        }});
      }}
      refresh();
    </script>
  </body>
</html>"##,
        base_url = escape_html(&settings.coingecko_base_url),
        vs_currency = escape_html(&settings.vs_currency),
        default_days = settings.default_history_days,
        max_days = MAX_HISTORY_DAYS,
        attribution = ATTRIBUTION,
        attribution_url = ATTRIBUTION_URL,
    )
}
