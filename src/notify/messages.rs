use crate::ledger::LedgerRecord;
use crate::models::signal::{format_price, pip_size};
use crate::models::{Direction, Signal, SignalResult};

/// Entry announcement for a freshly created signal.
pub fn entry_message(signal: &Signal, digits: u32) -> String {
    let arrow = match signal.direction {
        Direction::Buy => "📈 *BUY*",
        Direction::Sell => "📉 *SELL*",
    };

    let mut msg = format!(
        "🚦 *New Trade Signal*\n\n\
         [{}] {}\n\
         Entry: `{}`\n\
         SL: `{}`\n\
         TP1: `{}` | TP2: `{}` | TP3: `{}`\n",
        signal.symbol,
        arrow,
        format_price(signal.entry, digits),
        format_price(signal.sl, digits),
        format_price(signal.tp1, digits),
        format_price(signal.tp2, digits),
        format_price(signal.tp3, digits),
    );

    let reason = match (signal.pattern.is_empty(), signal.note.is_empty()) {
        (false, false) => format!("{} ({})", signal.pattern, signal.note),
        (false, true) => signal.pattern.clone(),
        (true, false) => signal.note.clone(),
        (true, true) => String::new(),
    };
    if !reason.is_empty() {
        msg.push_str(&format!("\n📋 Setup: _{}_\n", reason));
    }

    msg.push_str(&format!(
        "\n⏱ Sent: `{}`\n\nManage your risk on every position.",
        signal.date_string()
    ));
    msg
}

/// Closure announcement for a terminal transition of a tracked row.
pub fn closure_message(record: &LedgerRecord, result: SignalResult, digits: u32) -> String {
    let direction = record.direction;
    let entry = record.entry.unwrap_or(0.0);
    let order_ref = format!(
        "{} {} @{}",
        record.symbol,
        direction.map_or("?", |d| d.as_str()),
        record.date
    );

    let pip = pip_size(digits);
    let signed_pips = |close_price: f64| -> f64 {
        let diff = match direction {
            Some(Direction::Buy) => close_price - entry,
            Some(Direction::Sell) => entry - close_price,
            None => 0.0,
        };
        (diff / pip * 10.0).round() / 10.0
    };

    let (header, footer) = match result {
        SignalResult::Tp1 | SignalResult::Tp2 | SignalResult::Tp3 => {
            let close_price = match result {
                SignalResult::Tp1 => record.tp1,
                SignalResult::Tp2 => record.tp2,
                _ => record.tp3,
            }
            .unwrap_or(entry);
            (
                format!(
                    "🎯 *{}!* {} +{} pips\n(Order: {})",
                    result.as_str(),
                    record.symbol,
                    signed_pips(close_price),
                    order_ref
                ),
                "Target reached. Stick to the plan and keep managing the account.",
            )
        }
        SignalResult::Sl => {
            let close_price = record.sl.unwrap_or(entry);
            (
                format!(
                    "⚠️ *SL!* {} {} pips\n(Order: {})",
                    record.symbol,
                    signed_pips(close_price),
                    order_ref
                ),
                "Stopped out. Regroup and wait for the next setup.",
            )
        }
        SignalResult::Expired => (
            format!("⌛ *Expired*: {}\n(Order: {})", record.symbol, order_ref),
            "Order timed out and was closed by the risk plan.",
        ),
        SignalResult::Pending | SignalResult::Running => return String::new(),
    };

    format!("{}\n\n{}", header, footer)
}

/// Break-even trail notice.
pub fn breakeven_message(symbol: &str, entry: f64, digits: u32) -> String {
    format!(
        "🔒 Move SL → BE @ {} ({})",
        symbol,
        format_price(entry, digits)
    )
}
