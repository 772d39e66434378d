// Text typing with an optional per-character interval.
use std::time::Duration;

use crate::errors::MarketResult;
use crate::executor::input::InputDriver;
use crate::perception::wait::Clock;

/// Type `text`, pausing `interval` after each character when non-zero.
/// A zero interval sends the whole string in one call.
pub fn type_with_interval(
    input: &mut dyn InputDriver,
    clock: &dyn Clock,
    text: &str,
    interval: Duration,
) -> MarketResult<()> {
    if interval.is_zero() {
        return input.type_text(text);
    }
    let mut buf = [0u8; 4];
    for c in text.chars() {
        input.type_text(c.encode_utf8(&mut buf))?;
        clock.sleep(interval);
    }
    Ok(())
}
