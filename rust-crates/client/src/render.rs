use crate::hub_client::{
    GrapeOutcome,
    PlayerStatus,
    RankedPlayer,
};

pub const GAME_OVER: &str = "☠️ You ate the deadly grape! Game Over.";
const COMING_SOON_SLOTS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEntry {
    pub title: &'static str,
    pub playable: bool,
}

pub fn game_catalog() -> Vec<GameEntry> {
    let mut games = vec![GameEntry {
        title: "Grape or Grave",
        playable: true,
    }];
    games.extend((0..COMING_SOON_SLOTS).map(|_| GameEntry {
        title: "Coming Soon",
        playable: false,
    }));
    games
}

/// `1234567` with `$` becomes `$1,234,567`.
pub fn format_amount(amount: u64, currency_symbol: &str) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{currency_symbol}{grouped}")
}

pub fn display_name(name: &str) -> &str {
    if name.trim().is_empty() {
        "Anonymous"
    } else {
        name
    }
}

pub fn hub_screen(name: &str) -> String {
    let mut lines = vec![format!("Welcome, {}", display_name(name)), String::new()];
    for (i, game) in game_catalog().iter().enumerate() {
        let hint = if game.playable {
            "  (play with `grape eat`)"
        } else {
            ""
        };
        lines.push(format!("{:>2}. {}{}", i + 1, game.title, hint));
    }
    lines.join("\n")
}

pub fn status_line(status: &PlayerStatus, currency_symbol: &str) -> String {
    let state = if status.is_dead { "DEAD" } else { "ALIVE" };
    format!(
        "{}: {} | grapes eaten: {} | {}",
        display_name(&status.name),
        format_amount(status.bank_balance, currency_symbol),
        status.grapes_eaten,
        state
    )
}

pub fn grape_line(outcome: &GrapeOutcome, currency_symbol: &str) -> String {
    if !outcome.accepted {
        return format!(
            "You are already dead. Final bank: {} after {} grapes.",
            format_amount(outcome.bank_balance, currency_symbol),
            outcome.grapes_eaten
        );
    }
    let line = format!(
        "🍇 Grape #{} | bank: {}",
        outcome.grapes_eaten,
        format_amount(outcome.bank_balance, currency_symbol)
    );
    if outcome.fatal {
        format!("{line}\n{GAME_OVER}")
    } else {
        line
    }
}

pub fn leaderboard_table(
    title: &str,
    rows: &[RankedPlayer],
    currency_symbol: &str,
) -> String {
    let mut out = vec![title.to_string()];
    if rows.is_empty() {
        out.push("  (nobody yet)".to_string());
        return out.join("\n");
    }
    let cells: Vec<(String, String, String)> = rows
        .iter()
        .map(|row| {
            (
                display_name(&row.name).to_string(),
                format_amount(row.bank_balance, currency_symbol),
                row.grapes_eaten.to_string(),
            )
        })
        .collect();
    let name_width = cells
        .iter()
        .map(|(name, _, _)| name.chars().count())
        .chain(["Name".len()])
        .max()
        .unwrap_or(4);
    let balance_width = cells
        .iter()
        .map(|(_, balance, _)| balance.chars().count())
        .chain(["Bank".len()])
        .max()
        .unwrap_or(4);
    out.push(format!(
        "  #  {:<name_width$}  {:>balance_width$}  Grapes",
        "Name", "Bank"
    ));
    for (rank, (name, balance, grapes)) in cells.iter().enumerate() {
        out.push(format!(
            "{:>3}  {:<name_width$}  {:>balance_width$}  {:>6}",
            rank + 1,
            name,
            balance,
            grapes
        ));
    }
    out.join("\n")
}
