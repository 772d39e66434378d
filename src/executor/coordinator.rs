//! The coordinator owns the exclusive input device together with the screen
//! locator and carries out every pointer and keyboard action on their behalf.
//! All actions are synchronous and run strictly in call order.

use std::time::Duration;

use crate::config::{InputConfig, LocatorConfig};
use crate::errors::{MarketError, MarketResult};
use crate::executor::input::{InputDriver, MouseButton};
use crate::executor::safety::check_fail_safe;
use crate::executor::text_input::type_with_interval;
use crate::perception::locator::ScreenLocator;
use crate::perception::types::{Point, Region};
use crate::perception::wait::{Clock, Deadline};

/// Delays and defaults applied around clicks.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickTiming {
    pub pre_click_delay: Duration,
    pub image_settle: Duration,
    pub after_image_click: Duration,
    pub visible_timeout: Duration,
    pub confidence: f64,
    pub click_confidence: f64,
    pub fail_safe: bool,
}

impl Default for ClickTiming {
    fn default() -> Self {
        Self::from_config(&InputConfig::default(), &LocatorConfig::default())
    }
}

impl ClickTiming {
    pub fn from_config(input: &InputConfig, locator: &LocatorConfig) -> Self {
        Self {
            pre_click_delay: Duration::from_millis(input.pre_click_delay_ms),
            image_settle: Duration::from_millis(input.image_settle_ms),
            after_image_click: Duration::from_millis(input.after_image_click_ms),
            visible_timeout: locator.visible_timeout(),
            confidence: locator.confidence,
            click_confidence: locator.click_confidence,
            fail_safe: input.fail_safe,
        }
    }

    /// No delays at all; handy for scripted runs against fakes.
    pub fn immediate() -> Self {
        Self {
            pre_click_delay: Duration::ZERO,
            image_settle: Duration::ZERO,
            after_image_click: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// A click on a reference image found on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageClick<'a> {
    pub name: &'a str,
    pub offset: Point,
    pub confidence: f64,
    pub button: MouseButton,
    pub repeat: u32,
}

impl<'a> ImageClick<'a> {
    pub fn new(name: &'a str, confidence: f64) -> Self {
        Self {
            name,
            offset: Point::ORIGIN,
            confidence,
            button: MouseButton::Left,
            repeat: 1,
        }
    }
}

pub struct Coordinator {
    locator: ScreenLocator,
    input: Box<dyn InputDriver>,
    timing: ClickTiming,
    recovery_image: Option<String>,
}

impl Coordinator {
    pub fn new(locator: ScreenLocator, input: Box<dyn InputDriver>, timing: ClickTiming) -> Self {
        Self {
            locator,
            input,
            timing,
            recovery_image: None,
        }
    }

    /// Image clicked while a wait keeps failing.
    pub fn with_recovery_image(mut self, name: Option<String>) -> Self {
        self.recovery_image = name;
        self
    }

    pub fn locator(&self) -> &ScreenLocator {
        &self.locator
    }

    pub fn locator_mut(&mut self) -> &mut ScreenLocator {
        &mut self.locator
    }

    pub fn timing(&self) -> &ClickTiming {
        &self.timing
    }

    pub fn clock(&self) -> &dyn Clock {
        self.locator.clock().as_ref()
    }

    pub fn sleep(&self, duration: Duration) {
        self.clock().sleep(duration);
    }

    /// True when the fail-safe point is occupied and input must stop.
    pub fn fail_safe_tripped(&mut self) -> bool {
        match check_fail_safe(self.input.as_mut()) {
            Ok(()) => false,
            Err(e @ MarketError::FailSafe(_)) => {
                tracing::error!(error = %e, "refusing to touch the input device");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not read pointer position for fail-safe check");
                false
            }
        }
    }

    pub fn move_to(&mut self, point: Point) -> MarketResult<()> {
        self.input.move_to(point)
    }

    pub fn click_at(&mut self, point: Point, button: MouseButton, repeat: u32) -> MarketResult<()> {
        self.input.move_to(point)?;
        self.input.click(button, repeat)
    }

    /// Search for the image and click it. Returns false when it is not on screen.
    pub fn click_image(&mut self, target: &ImageClick<'_>) -> bool {
        click_image_with(&self.locator, self.input.as_mut(), &self.timing, target, Deadline::Never)
    }

    /// Search for the image and move the pointer over it.
    pub fn move_to_image(&mut self, name: &str, offset: Point, confidence: f64) -> bool {
        self.sleep(self.timing.image_settle);
        let Some(position) = self.locator.locate(name, confidence) else {
            tracing::debug!(image = %name, "Not moved to image");
            return false;
        };
        match self.input.move_to(position + offset) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(image = %name, error = %e, "pointer move failed");
                false
            }
        }
    }

    /// Wait for an image, clicking the recovery image at every checkpoint.
    pub fn wait_image(&mut self, name: &str, confidence: f64, deadline: Deadline) -> bool {
        let Self {
            locator,
            input,
            timing,
            recovery_image,
        } = self;
        let locator: &ScreenLocator = locator;
        let recovery = recovery_image.as_deref();
        locator.wait(name, confidence, deadline, |budget| {
            if let Some(revive) = recovery {
                tracing::info!(image = %name, recovery = %revive, "still hidden, clicking recovery image");
                let target = ImageClick::new(revive, timing.click_confidence);
                click_image_with(locator, input.as_mut(), timing, &target, budget);
            }
        })
    }

    /// Wait for text, clicking the recovery image at every checkpoint.
    pub fn wait_text(&mut self, needle: &str, deadline: Deadline, region: Option<Region>) -> Option<Point> {
        let Self {
            locator,
            input,
            timing,
            recovery_image,
        } = self;
        let locator: &ScreenLocator = locator;
        let recovery = recovery_image.as_deref();
        locator.wait_text(needle, deadline, region, |budget| {
            if let Some(revive) = recovery {
                tracing::info!(needle = %needle, recovery = %revive, "text still hidden, clicking recovery image");
                let target = ImageClick::new(revive, timing.click_confidence);
                click_image_with(locator, input.as_mut(), timing, &target, budget);
            }
        })
    }

    pub fn locate_text(&self, region: Option<Region>, needle: &str) -> Option<Point> {
        self.locator.locate_text(region, needle)
    }

    /// Find text on screen and move the pointer over it.
    pub fn move_to_text(&mut self, needle: &str, offset: Point, region: Option<Region>) -> bool {
        let Some(position) = self.locator.locate_text(region, needle) else {
            return false;
        };
        match self.input.move_to(position + offset) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(needle = %needle, error = %e, "pointer move failed");
                false
            }
        }
    }

    pub fn hotkey(&mut self, keys: &[&str]) -> MarketResult<()> {
        tracing::debug!(keys = ?keys, "hotkey");
        self.input.press_keys(keys)
    }

    pub fn type_text(&mut self, text: &str, interval: Duration) -> MarketResult<()> {
        let clock = self.locator.clock().clone();
        type_with_interval(self.input.as_mut(), clock.as_ref(), text, interval)
    }
}

/// Settle, locate and click. Neither delay outlasts `budget`.
fn click_image_with(
    locator: &ScreenLocator,
    input: &mut dyn InputDriver,
    timing: &ClickTiming,
    target: &ImageClick<'_>,
    budget: Deadline,
) -> bool {
    let clock = locator.clock();
    let start = clock.now();
    clock.sleep(budget.cap(timing.image_settle));
    let Some(position) = locator.locate(target.name, target.confidence) else {
        tracing::debug!(image = %target.name, "Not clicked");
        return false;
    };
    let point = position + target.offset;
    let clicked = input
        .move_to(point)
        .and_then(|()| input.click(target.button, target.repeat));
    if let Err(e) = clicked {
        tracing::error!(image = %target.name, error = %e, "image click failed");
        return false;
    }
    tracing::debug!(image = %target.name, point = %point, "Image clicked");
    let left = budget.remaining(clock.now().duration_since(start));
    clock.sleep(left.cap(timing.after_image_click));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::perception::images::ImageRepository;
    use crate::perception::locator::PollSettings;
    use crate::perception::types::TextFragment;
    use crate::testing::{noise_image, paste, FakeClock, FakeOcr, InputEvent, RecordingInput, StaticScreen};

    fn coordinator(frame: image::RgbaImage, images: ImageRepository, input: RecordingInput) -> (Coordinator, Arc<FakeClock>) {
        let clock = FakeClock::shared();
        let locator = ScreenLocator::new(images, Box::new(StaticScreen::new(frame)), clock.clone(), PollSettings::default());
        (Coordinator::new(locator, Box::new(input), ClickTiming::default()), clock)
    }

    fn coordinator_reading(
        frame: image::RgbaImage,
        images: ImageRepository,
        fragments: Vec<TextFragment>,
        input: RecordingInput,
    ) -> (Coordinator, Arc<FakeClock>) {
        let clock = FakeClock::shared();
        let locator = ScreenLocator::new(images, Box::new(StaticScreen::new(frame)), clock.clone(), PollSettings::default())
            .with_ocr(Box::new(FakeOcr::new(fragments)));
        (Coordinator::new(locator, Box::new(input), ClickTiming::default()), clock)
    }

    fn with_reconnect(frame: &mut image::RgbaImage) -> ImageRepository {
        let revive = noise_image(20, 12, 2, 5);
        paste(frame, &revive, 100, 60);
        let mut images = ImageRepository::empty("unused");
        images.insert("reconnect", revive);
        images.insert("orders", noise_image(20, 12, 2, 6));
        images
    }

    #[test]
    fn click_image_moves_with_offset_and_settles() {
        let template = noise_image(20, 12, 2, 31);
        let mut frame = noise_image(160, 100, 3, 2);
        paste(&mut frame, &template, 40, 30);
        let mut images = ImageRepository::empty("unused");
        images.insert("buy_order_button", template);
        let input = RecordingInput::new();
        let (mut coord, clock) = coordinator(frame, images, input.clone());

        let mut target = ImageClick::new("buy_order_button", 0.9);
        target.offset = Point::new(100, 0);
        target.button = MouseButton::Right;
        target.repeat = 2;
        assert!(coord.click_image(&target));

        assert_eq!(
            input.events(),
            vec![
                InputEvent::Move(Point::new(150, 36)),
                InputEvent::Click {
                    at: Point::new(150, 36),
                    button: MouseButton::Right,
                    repeat: 2
                },
            ]
        );
        assert_eq!(clock.elapsed(), Duration::from_millis(2500));
    }

    #[test]
    fn click_image_misses_without_input() {
        let frame = noise_image(160, 100, 3, 2);
        let mut images = ImageRepository::empty("unused");
        images.insert("buy_order_button", noise_image(20, 12, 2, 31));
        let input = RecordingInput::new();
        let (mut coord, _) = coordinator(frame, images, input.clone());

        assert!(!coord.click_image(&ImageClick::new("buy_order_button", 0.9)));
        assert!(input.events().is_empty());
    }

    #[test]
    fn move_to_image_moves_without_clicking() {
        let template = noise_image(20, 12, 2, 31);
        let mut frame = noise_image(160, 100, 3, 2);
        paste(&mut frame, &template, 40, 30);
        let mut images = ImageRepository::empty("unused");
        images.insert("orders", template);
        let input = RecordingInput::new();
        let (mut coord, clock) = coordinator(frame, images, input.clone());

        assert!(coord.move_to_image("orders", Point::new(-5, 10), 0.9));
        assert_eq!(input.events(), vec![InputEvent::Move(Point::new(45, 46))]);
        assert_eq!(clock.elapsed(), Duration::from_millis(500));
    }

    #[test]
    fn move_to_image_miss_leaves_pointer_alone() {
        let mut images = ImageRepository::empty("unused");
        images.insert("orders", noise_image(20, 12, 2, 31));
        let input = RecordingInput::new();
        let (mut coord, _) = coordinator(noise_image(160, 100, 3, 2), images, input.clone());

        assert!(!coord.move_to_image("orders", Point::ORIGIN, 0.9));
        assert!(input.events().is_empty());
    }

    #[test]
    fn move_to_text_targets_recognized_fragment() {
        let fragments = vec![TextFragment {
            text: "Orders".into(),
            left: 10,
            top: 20,
            width: 40,
            height: 10,
            confidence: 90.0,
        }];
        let input = RecordingInput::new();
        let (mut coord, _) = coordinator_reading(
            noise_image(160, 100, 3, 2),
            ImageRepository::empty("unused"),
            fragments,
            input.clone(),
        );

        assert!(coord.move_to_text("Order", Point::new(0, 3), Some(Region::new(5, 5, 100, 80))));
        assert_eq!(input.events(), vec![InputEvent::Move(Point::new(35, 33))]);
        assert!(!coord.move_to_text("Buy", Point::ORIGIN, None));
        assert_eq!(input.events().len(), 1);
    }

    #[test]
    fn wait_text_clicks_recovery_image_while_text_hidden() {
        let mut frame = noise_image(160, 100, 3, 2);
        let images = with_reconnect(&mut frame);
        let input = RecordingInput::new();
        let (coord, clock) = coordinator_reading(frame, images, Vec::new(), input.clone());
        let mut coord = coord.with_recovery_image(Some("reconnect".into()));

        let found = coord.wait_text("Orders", Deadline::After(Duration::from_secs(15)), None);
        assert!(found.is_none());
        let clicks = input.clicks();
        assert!(!clicks.is_empty());
        assert!(clicks.iter().all(|p| *p == Point::new(110, 66)));
        assert_eq!(clock.elapsed(), Duration::from_secs(15));
    }

    #[test]
    fn recovery_click_stays_inside_the_wait_deadline() {
        let mut frame = noise_image(160, 100, 3, 2);
        let images = with_reconnect(&mut frame);
        let input = RecordingInput::new();
        let (coord, clock) = coordinator(frame, images, input.clone());
        let mut coord = coord.with_recovery_image(Some("reconnect".into()));

        let visible = coord.wait_image("orders", 0.85, Deadline::After(Duration::from_secs(6)));
        assert!(!visible);
        assert_eq!(input.clicks(), vec![Point::new(110, 66)]);
        assert_eq!(clock.elapsed(), Duration::from_secs(6));
    }

    #[test]
    fn wait_image_clicks_recovery_image_while_target_hidden() {
        let mut frame = noise_image(160, 100, 3, 2);
        let images = with_reconnect(&mut frame);
        let input = RecordingInput::new();
        let (coord, _) = coordinator(frame, images, input.clone());
        let mut coord = coord.with_recovery_image(Some("reconnect".into()));

        let visible = coord.wait_image("orders", 0.85, Deadline::After(Duration::from_secs(20)));
        assert!(!visible);
        let clicks = input.clicks();
        assert!(!clicks.is_empty());
        assert!(clicks.iter().all(|p| *p == Point::new(110, 66)));
    }

    #[test]
    fn fail_safe_trips_at_origin() {
        let input = RecordingInput::new();
        input.park_pointer(Point::ORIGIN);
        let (mut coord, _) = coordinator(noise_image(10, 10, 1, 1), ImageRepository::empty("unused"), input.clone());
        assert!(coord.fail_safe_tripped());
        input.park_pointer(Point::new(400, 300));
        assert!(!coord.fail_safe_tripped());
    }
}
