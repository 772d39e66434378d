// Fail-safe interceptor: a pointer parked at the screen origin means the
// operator wants the automation to stop touching the input device.
use crate::errors::{MarketError, MarketResult};
use crate::executor::input::InputDriver;
use crate::perception::types::Point;

pub const FAIL_SAFE_POINT: Point = Point::ORIGIN;

/// Returns an error when the pointer sits on the fail-safe point.
pub fn check_fail_safe(input: &mut dyn InputDriver) -> MarketResult<()> {
    let pointer = input.pointer()?;
    if pointer == FAIL_SAFE_POINT {
        return Err(MarketError::FailSafe(pointer.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingInput;

    #[test]
    fn trips_only_at_origin() {
        let mut input = RecordingInput::new();
        input.park_pointer(Point::new(0, 0));
        assert!(matches!(check_fail_safe(&mut input), Err(MarketError::FailSafe(_))));

        input.park_pointer(Point::new(0, 1));
        assert!(check_fail_safe(&mut input).is_ok());
    }
}
