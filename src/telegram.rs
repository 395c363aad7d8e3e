use crate::types::{Direction, ExitReason, SessionSlot};

const BASE_URL: &str = "https://api.telegram.org";

/// Telegram notifier. Built from TELEGRAM_TOKEN / TELEGRAM_CHAT_ID; when the
/// env vars are absent every send is a no-op, so the bot still runs
/// unattended without a channel configured.
#[derive(Clone)]
pub struct TelegramBot {
    inner: Option<Inner>,
}

#[derive(Clone)]
struct Inner {
    client: reqwest::Client,
    url: String,
    chat_id: String,
}

impl TelegramBot {
    pub fn from_env() -> Self {
        let token = std::env::var("TELEGRAM_TOKEN").ok();
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok();
        let inner = match (token, chat_id) {
            (Some(token), Some(chat_id)) => Some(Inner {
                client: reqwest::Client::new(),
                url: format!("{}/bot{}/sendMessage", BASE_URL, token),
                chat_id,
            }),
            _ => {
                log::warn!("TELEGRAM_TOKEN/TELEGRAM_CHAT_ID not set — notifications disabled");
                None
            }
        };
        TelegramBot { inner }
    }

    pub async fn send(&self, text: &str) {
        let inner = match &self.inner {
            Some(i) => i,
            None => return,
        };
        let body = serde_json::json!({
            "chat_id": inner.chat_id,
            "text": text,
            "parse_mode": "HTML"
        });

        match inner.client.post(&inner.url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                let preview: String = text.chars().take(80).collect();
                log::info!("Telegram sent: {}", preview.replace('\n', " "));
            }
            Ok(resp) => {
                log::warn!("Telegram error status: {}", resp.status());
            }
            Err(e) => {
                log::warn!("Telegram send failed: {}", e);
            }
        }
    }

    // ── Convenience helpers ──────────────────────────────────────────────────

    pub async fn notify_start(&self, symbol: &str, base_lot: f64) {
        self.send(&format!(
            "🤖 <b>Range Trader started</b>\nSymbol: {symbol} | TF: M5 | Base lot: {base_lot:.2}",
        ))
        .await;
    }

    pub async fn notify_range(&self, slot: SessionSlot, high: f64, low: f64) {
        self.send(&format!(
            "📐 <b>{slot} range set</b>\nHigh: <code>{high:.5}</code>  Low: <code>{low:.5}</code>",
        ))
        .await;
    }

    pub async fn notify_breakout(
        &self,
        slot: SessionSlot,
        direction: Direction,
        price: f64,
        tp: f64,
    ) {
        let emoji = if direction == Direction::Long { "🟢" } else { "🔴" };
        self.send(&format!(
            "{emoji} <b>{slot} breakout — {direction}</b>\n\
             Price: <code>{price:.5}</code>\n\
             TP:    <code>{tp:.5}</code>\n\
             Waiting for pullback levels",
        ))
        .await;
    }

    pub async fn notify_reversal(
        &self,
        slot: SessionSlot,
        direction: Direction,
        price: f64,
        count: u8,
    ) {
        self.send(&format!(
            "🔄 <b>{slot} reversal #{count} — now {direction}</b>\nPrice: <code>{price:.5}</code>",
        ))
        .await;
    }

    pub async fn notify_trade_open(
        &self,
        slot: SessionSlot,
        direction: Direction,
        lots: f64,
        entry: f64,
        tp: f64,
    ) {
        let emoji = if direction == Direction::Long { "🟢" } else { "🔴" };
        self.send(&format!(
            "{emoji} <b>Trade Opened — {direction} ({slot})</b>\n\
             Lots:  <code>{lots:.2}</code>\n\
             Entry: <code>{entry:.5}</code>\n\
             TP:    <code>{tp:.5}</code>",
        ))
        .await;
    }

    pub async fn notify_trade_close(
        &self,
        slot: SessionSlot,
        direction: Direction,
        entry: f64,
        exit: f64,
        pnl: f64,
        reason: ExitReason,
    ) {
        let emoji = if pnl >= 0.0 { "✅" } else { "❌" };
        self.send(&format!(
            "{emoji} <b>Trade Closed — {direction} ({slot})</b>\n\
             Entry: <code>{entry:.5}</code>  Exit: <code>{exit:.5}</code>\n\
             PnL:   <code>{pnl:+.2}</code>\n\
             Reason: {reason}",
        ))
        .await;
    }

    pub async fn notify_daily_summary(&self, daily_pnl: f64, trades: u32, balance: f64) {
        self.send(&format!(
            "📊 <b>Daily Summary</b>\n\
             PnL:     <code>{daily_pnl:+.2}</code>\n\
             Trades:  <code>{trades}</code>\n\
             Balance: <code>{balance:.2}</code>",
        ))
        .await;
    }

    pub async fn notify_risk_alert(&self, message: &str) {
        let msg = format!("⚠️ <b>Risk Alert</b>\n{message}");
        self.send(&msg).await;
    }
}
