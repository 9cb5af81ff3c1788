//! Shared UI icons, with ASCII fallbacks for terminals without emoji support.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
pub static ARROW: Emoji<'_, '_> = Emoji("▶ ", "[>] ");
pub static QUESTION: Emoji<'_, '_> = Emoji("❓ ", "[?] ");
