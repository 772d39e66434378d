//! Screen locator: finds reference images and text on the live screen.
//!
//! Single searches (`locate`, `locate_text`) never fail loudly; a miss is a
//! normal `None`. The waiting variants poll on a fixed interval and run a
//! caller-supplied recovery action, handed the remaining budget, at every
//! checkpoint that passes without success.
use std::sync::Arc;
use std::time::Duration;

use crate::config::LocatorConfig;
use crate::perception::images::ImageRepository;
use crate::perception::matcher;
use crate::perception::traits::{ImageLookup, ScreenSource, TextRecognizer};
use crate::perception::types::{Point, Region};
use crate::perception::wait::{poll_until, Clock, Deadline, WaitPolicy};

/// Polling cadence shared by image and text waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub image_interval: Duration,
    pub text_interval: Duration,
    pub recovery_every: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            image_interval: Duration::from_millis(500),
            text_interval: Duration::from_secs(1),
            recovery_every: Duration::from_secs(5),
        }
    }
}

impl PollSettings {
    pub fn from_config(config: &LocatorConfig) -> Self {
        Self {
            image_interval: config.poll_interval(),
            text_interval: config.text_poll_interval(),
            recovery_every: config.recovery_every(),
        }
    }
}

pub struct ScreenLocator {
    images: ImageRepository,
    screen: Box<dyn ScreenSource>,
    ocr: Option<Box<dyn TextRecognizer>>,
    clock: Arc<dyn Clock>,
    poll: PollSettings,
}

impl ScreenLocator {
    pub fn new(
        images: ImageRepository,
        screen: Box<dyn ScreenSource>,
        clock: Arc<dyn Clock>,
        poll: PollSettings,
    ) -> Self {
        Self {
            images,
            screen,
            ocr: None,
            clock,
            poll,
        }
    }

    pub fn with_ocr(mut self, ocr: Box<dyn TextRecognizer>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn images(&self) -> &ImageRepository {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut ImageRepository {
        &mut self.images
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// One screen search for `name`; returns the center of the best match.
    pub fn locate(&self, name: &str, confidence: f64) -> Option<Point> {
        let Some(template) = self.images.lookup(name) else {
            tracing::error!(image = %name, "Image not mapped, check image folder!");
            return None;
        };
        let frame = match self.screen.capture(None) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(image = %name, error = %e, "screen capture failed");
                return None;
            }
        };
        match matcher::find_best(&frame, template, confidence) {
            Some(found) => {
                tracing::trace!(image = %name, score = found.score, "image matched");
                Some(found.center())
            }
            None => {
                tracing::debug!(image = %name, "Image not found!");
                None
            }
        }
    }

    /// Poll `locate` until found or `deadline` passes.
    pub fn wait(
        &self,
        name: &str,
        confidence: f64,
        deadline: Deadline,
        recover: impl FnMut(Deadline),
    ) -> bool {
        let policy = WaitPolicy::new(self.poll.image_interval, deadline, self.poll.recovery_every);
        let visible = poll_until(self.clock.as_ref(), &policy, || self.locate(name, confidence), recover)
            .is_some();
        tracing::debug!(image = %name, visible, "wait finished");
        visible
    }

    /// OCR the region (or full screen) and return the center of the first
    /// fragment containing `needle`, in screen coordinates.
    pub fn locate_text(&self, region: Option<Region>, needle: &str) -> Option<Point> {
        let Some(ocr) = &self.ocr else {
            tracing::error!("text search requested but OCR is not configured");
            return None;
        };
        let frame = match self.screen.capture(region) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "screen capture failed");
                return None;
            }
        };
        let fragments = match ocr.recognize(&frame) {
            Ok(fragments) => fragments,
            Err(e) => {
                tracing::warn!(error = %e, "OCR failed");
                return None;
            }
        };
        let origin = region.map_or(Point::ORIGIN, |r| Point::new(r.x.max(0), r.y.max(0)));
        match fragments.iter().find(|f| f.text.contains(needle)) {
            Some(fragment) => {
                tracing::debug!(text = %fragment.text, "Text found!");
                Some(origin + fragment.center())
            }
            None => {
                tracing::warn!(needle = %needle, "Text not found!");
                None
            }
        }
    }

    /// Poll `locate_text` until found or `deadline` passes.
    pub fn wait_text(
        &self,
        needle: &str,
        deadline: Deadline,
        region: Option<Region>,
        recover: impl FnMut(Deadline),
    ) -> Option<Point> {
        let policy = WaitPolicy::new(self.poll.text_interval, deadline, self.poll.recovery_every);
        let found = poll_until(self.clock.as_ref(), &policy, || self.locate_text(region, needle), recover);
        tracing::debug!(needle = %needle, found = found.is_some(), "text wait finished");
        found
    }
}
