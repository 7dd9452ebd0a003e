//! Terminal tables for the command line.

use crate::{
    model::{
        Page,
        ServerRecord,
        StatisticItem,
        StatisticRollup,
    },
    store::RemovalSummary,
    tracker::ServerDetailsView,
};
use chrono::DateTime;
use comfy_table::{
    presets,
    Attribute,
    Cell,
    Color,
    ContentArrangement,
    Table,
};

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    table
}

fn timestamp(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn flag(on: bool) -> Cell {
    if on {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no").fg(Color::DarkGrey)
    }
}

pub fn servers(page: &Page<ServerRecord>) -> String {
    let mut table = table(vec!["Row", "Name", "Platform", "Area", "Players", "Mode", "Intent", "PvP", "Password"]);
    for server in &page.items {
        let full = server.connected >= server.max_connections;
        table.add_row(vec![
            Cell::new(&server.row_id),
            Cell::new(&server.name),
            Cell::new(&server.platform_name),
            Cell::new(&server.area),
            Cell::new(format!("{}/{}", server.connected, server.max_connections))
                .fg(if full { Color::Yellow } else { Color::Reset }),
            Cell::new(&server.game_mode),
            Cell::new(&server.intent),
            flag(server.pvp_enabled),
            flag(server.has_password),
        ]);
    }

    let epoch = page
        .items
        .first()
        .map(|s| format!(" from {}", timestamp(s.created_at)))
        .unwrap_or_default();
    format!("{table}\n{} of {} servers{epoch}", page.items.len(), page.total)
}

pub fn details(view: &ServerDetailsView) -> String {
    let server = &view.server;
    let details = &view.details;

    let mut summary = table(vec!["Field", "Value"]);
    for (field, value) in [
        ("Name", server.name.clone()),
        ("Row", server.row_id.clone()),
        ("Address", format!("{}:{}", server.address, server.port)),
        ("Platform", server.platform_name.clone()),
        ("Location", format!("{} {} {}", server.continent, server.area, server.city)),
        ("Players", format!("{}/{}", server.connected, server.max_connections)),
        ("Mode", format!("{} / {}", server.game_mode, server.intent)),
        ("Season", server.season.clone()),
        (
            "Day",
            format!(
                "{} ({} elapsed, {} left in season)",
                details.day, details.days_elapsed_in_season, details.days_left_in_season
            ),
        ),
    ] {
        summary.add_row(vec![Cell::new(field).add_attribute(Attribute::Bold), Cell::new(value)]);
    }

    let mut players = table(vec!["Player", "Character", "Net id"]);
    for player in &details.players {
        players.add_row(vec![&player.name, &player.prefab, &player.net_id]);
    }

    let mut mods = table(vec!["Mod", "Version", "Enabled"]);
    for m in &details.mods {
        mods.add_row(vec![Cell::new(&m.name), Cell::new(&m.version), flag(m.enabled)]);
    }

    format!("{summary}\n{players}\n{mods}")
}

fn breakdown(items: &[StatisticItem]) -> String {
    items
        .iter()
        .take(5)
        .map(|i| format!("{} {}", if i.label.is_empty() { "?" } else { i.label.as_str() }, i.total_servers))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn statistics(rollups: &[StatisticRollup]) -> String {
    if rollups.is_empty() {
        return "No statistics recorded for the requested range".to_string();
    }

    let mut table = table(vec!["Time", "Servers", "Players", "Platforms", "Areas"]);
    for rollup in rollups {
        table.add_row(vec![
            Cell::new(timestamp(rollup.ts)),
            Cell::new(rollup.total_servers),
            Cell::new(rollup.online_players),
            Cell::new(breakdown(&rollup.platforms)),
            Cell::new(breakdown(&rollup.areas)),
        ]);
    }
    table.to_string()
}

pub fn removal(summary: &RemovalSummary) -> String {
    format!("deleted {} records, {} remaining", summary.deleted, summary.remaining)
}
