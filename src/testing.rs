//! Fakes shared by unit tests: a manual clock, scripted screens, a canned
//! OCR engine and an input driver that records everything it is asked to do.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};

use crate::errors::{MarketError, MarketResult};
use crate::executor::input::{InputDriver, MouseButton};
use crate::perception::screenshot::crop_region;
use crate::perception::traits::{ScreenSource, TextRecognizer};
use crate::perception::types::{Point, Region, TextFragment};
use crate::perception::wait::Clock;

/// Clock that only moves when something sleeps on it.
pub struct FakeClock {
    base: Instant,
    elapsed: Mutex<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
    }
}

/// Deterministic blocky noise; `block` controls the size of flat squares.
pub fn noise_image(width: u32, height: u32, block: u32, seed: u32) -> RgbaImage {
    let block = block.max(1);
    let cols = width.div_ceil(block);
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(0x9E37_79B9) | 1;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state
    };
    let rows = height.div_ceil(block);
    let cells: Vec<[u8; 3]> = (0..cols * rows)
        .map(|_| {
            let v = next();
            [v as u8, (v >> 8) as u8, (v >> 16) as u8]
        })
        .collect();
    RgbaImage::from_fn(width, height, |x, y| {
        let [r, g, b] = cells[((y / block) * cols + x / block) as usize];
        Rgba([r, g, b, 255])
    })
}

/// Copy `patch` onto `frame` with its top-left corner at (`left`, `top`).
pub fn paste(frame: &mut RgbaImage, patch: &RgbaImage, left: u32, top: u32) {
    image::imageops::replace(frame, patch, left as i64, top as i64);
}

pub struct StaticScreen {
    frame: RgbaImage,
}

impl StaticScreen {
    pub fn new(frame: RgbaImage) -> Self {
        Self { frame }
    }
}

impl ScreenSource for StaticScreen {
    fn capture(&self, region: Option<Region>) -> MarketResult<RgbaImage> {
        match region {
            None => Ok(self.frame.clone()),
            Some(region) => crop_region(&self.frame, region),
        }
    }
}

/// Yields its frames in order, then keeps returning the last one.
pub struct SequenceScreen {
    frames: Mutex<Vec<RgbaImage>>,
}

impl SequenceScreen {
    pub fn new(mut frames: Vec<RgbaImage>) -> Self {
        frames.reverse();
        Self {
            frames: Mutex::new(frames),
        }
    }
}

impl ScreenSource for SequenceScreen {
    fn capture(&self, region: Option<Region>) -> MarketResult<RgbaImage> {
        let mut frames = self.frames.lock().unwrap();
        let frame = if frames.len() > 1 {
            frames.pop()
        } else {
            frames.last().cloned()
        }
        .ok_or_else(|| MarketError::Capture("no frames left".into()))?;
        match region {
            None => Ok(frame),
            Some(region) => crop_region(&frame, region),
        }
    }
}

/// OCR engine returning the same fragments for every image.
pub struct FakeOcr {
    fragments: Vec<TextFragment>,
}

impl FakeOcr {
    pub fn new(fragments: Vec<TextFragment>) -> Self {
        Self { fragments }
    }
}

impl TextRecognizer for FakeOcr {
    fn recognize(&self, _image: &RgbaImage) -> MarketResult<Vec<TextFragment>> {
        Ok(self.fragments.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Move(Point),
    Click { at: Point, button: MouseButton, repeat: u32 },
    Type(String),
    Keys(Vec<String>),
}

#[derive(Default)]
struct Recorded {
    events: Vec<InputEvent>,
    pointer: Point,
    field: String,
    selected: bool,
}

/// Input driver that records events and emulates one focused text field:
/// `ctrl+a` selects its contents, typing replaces a selection or appends.
#[derive(Clone, Default)]
pub struct RecordingInput {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(text: &str) -> Self {
        let input = Self::new();
        input.inner.lock().unwrap().field = text.to_string();
        input
    }

    pub fn park_pointer(&self, at: Point) {
        self.inner.lock().unwrap().pointer = at;
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn clicks(&self) -> Vec<Point> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Click { at, .. } => Some(at),
                _ => None,
            })
            .collect()
    }

    pub fn field(&self) -> String {
        self.inner.lock().unwrap().field.clone()
    }
}

impl InputDriver for RecordingInput {
    fn move_to(&mut self, point: Point) -> MarketResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.pointer = point;
        inner.events.push(InputEvent::Move(point));
        Ok(())
    }

    fn click(&mut self, button: MouseButton, repeat: u32) -> MarketResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let at = inner.pointer;
        inner.selected = false;
        inner.events.push(InputEvent::Click { at, button, repeat });
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> MarketResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.selected {
            inner.field.clear();
            inner.selected = false;
        }
        inner.field.push_str(text);
        inner.events.push(InputEvent::Type(text.to_string()));
        Ok(())
    }

    fn press_keys(&mut self, keys: &[&str]) -> MarketResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let keys: Vec<String> = keys.iter().map(|k| k.to_lowercase()).collect();
        if keys == ["ctrl", "a"] {
            inner.selected = true;
        }
        inner.events.push(InputEvent::Keys(keys));
        Ok(())
    }

    fn pointer(&mut self) -> MarketResult<Point> {
        Ok(self.inner.lock().unwrap().pointer)
    }
}
