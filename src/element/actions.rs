//! Operations on a single element: visibility checks, clicks and text entry.
//!
//! Every operation reports a miss as `false` / `None` plus a log line; a
//! missing element is a normal branch for callers probing the screen.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::element::tree::{ElementId, Node, UiTree};
use crate::errors::MarketResult;
use crate::executor::coordinator::{Coordinator, ImageClick};
use crate::executor::input::MouseButton;
use crate::perception::traits::ImageLookup;
use crate::perception::types::{Point, Region};
use crate::perception::wait::Deadline;

/// How a click target is resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum Via {
    /// Cached tree location; falls back to `Image` when the element has none.
    #[default]
    Coordinates,
    /// Live search for the bound reference image.
    Image,
    /// OCR search for `needle` inside `region` (full screen when absent).
    Text {
        needle: String,
        #[serde(default)]
        region: Option<Region>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClickOptions {
    pub offset: Point,
    /// Match confidence for image clicks; `None` uses the configured default.
    pub confidence: Option<f64>,
    pub button: MouseButton,
    pub repeat: u32,
    /// Wait before clicking; `None` uses the configured pre-click delay.
    pub delay: Option<Duration>,
    /// Click every ancestor from the root down before the element itself.
    pub walk: bool,
    pub via: Via,
    pub fail_safe: bool,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            offset: Point::ORIGIN,
            confidence: None,
            button: MouseButton::Left,
            repeat: 1,
            delay: None,
            walk: false,
            via: Via::Coordinates,
            fail_safe: false,
        }
    }
}

impl ClickOptions {
    pub fn offset(mut self, offset: Point) -> Self {
        self.offset = offset;
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn button(mut self, button: MouseButton) -> Self {
        self.button = button;
        self
    }

    pub fn repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn walk(mut self, walk: bool) -> Self {
        self.walk = walk;
        self
    }

    pub fn via(mut self, via: Via) -> Self {
        self.via = via;
        self
    }

    pub fn fail_safe(mut self, fail_safe: bool) -> Self {
        self.fail_safe = fail_safe;
        self
    }

    /// Options used for ancestors during a walk: plain single left click.
    /// A text target only describes the final element, so ancestors fall
    /// back to their coordinates.
    fn walk_step(&self) -> Self {
        let via = match &self.via {
            Via::Text { .. } => Via::Coordinates,
            via => via.clone(),
        };
        Self {
            offset: Point::ORIGIN,
            button: MouseButton::Left,
            repeat: 1,
            walk: false,
            via,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOptions {
    /// Pause after each typed character.
    pub interval: Duration,
    pub enter: bool,
    pub offset: Point,
    pub via: Via,
    /// Select all existing text first so typing replaces it.
    pub clear: bool,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            interval: Duration::ZERO,
            enter: false,
            offset: Point::ORIGIN,
            via: Via::Coordinates,
            clear: true,
        }
    }
}

/// Borrowed view of one element of a [`UiTree`].
#[derive(Clone, Copy)]
pub struct Element<'t> {
    tree: &'t UiTree,
    id: ElementId,
    node: &'t Node,
}

impl std::fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("name", &self.node.name)
            .field("location", &self.node.location)
            .finish()
    }
}

impl UiTree {
    pub fn element(&self, id: ElementId) -> Option<Element<'_>> {
        self.node(id).map(|node| Element { tree: self, id, node })
    }

    pub fn get(&self, name: &str) -> Option<Element<'_>> {
        self.find(name).and_then(|id| self.element(id))
    }

    /// Search for the element's image and anchor it (and its subtree) there.
    pub fn relocate(&mut self, id: ElementId, coord: &Coordinator, confidence: f64) -> bool {
        let Some(found) = self.element(id).and_then(|e| e.locate(coord, confidence, true)) else {
            return false;
        };
        match self.anchor(id, found) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "relocate failed");
                false
            }
        }
    }
}

impl<'t> Element<'t> {
    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> &'t str {
        &self.node.name
    }

    pub fn offset(&self) -> Option<Point> {
        self.node.offset
    }

    /// Cached absolute location, `None` for an unanchored root.
    pub fn location(&self) -> Option<Point> {
        self.node.location
    }

    /// Absolute location, defaulting to the screen origin.
    pub fn resolve_location(&self) -> Point {
        self.node.location.unwrap_or(Point::ORIGIN)
    }

    pub fn bound_image(&self) -> Option<&'t str> {
        self.node.image.as_deref()
    }

    pub fn parent(&self) -> Option<Element<'t>> {
        self.node.parent.and_then(|p| self.tree.element(p))
    }

    pub fn child(&self, name: &str) -> Option<Element<'t>> {
        self.node.children.get(name).and_then(|c| self.tree.element(*c))
    }

    pub fn children(&self) -> Vec<Element<'t>> {
        self.node
            .children
            .values()
            .filter_map(|c| self.tree.element(*c))
            .collect()
    }

    /// Root first, ending with this element.
    pub fn walk_path(&self) -> Vec<Element<'t>> {
        self.tree
            .walk_path(self.id)
            .into_iter()
            .filter_map(|id| self.tree.element(id))
            .collect()
    }

    /// Whether live image search is possible for this element.
    pub fn is_valid(&self, coord: &Coordinator) -> bool {
        match self.bound_image() {
            Some(image) => coord.locator().images().contains(image),
            None => false,
        }
    }

    fn searchable_image(&self, coord: &Coordinator) -> Option<&'t str> {
        let Some(image) = self.bound_image() else {
            tracing::info!(element = %self.name(), "element has no bound image");
            return None;
        };
        if !coord.locator().images().contains(image) {
            tracing::info!(element = %self.name(), image = %image, "bound image is not in the repository");
            return None;
        }
        Some(image)
    }

    /// Wait up to `timeout` for the bound image to show up.
    pub fn is_visible(&self, coord: &mut Coordinator, confidence: f64, timeout: Duration) -> bool {
        match self.searchable_image(coord) {
            Some(image) => coord.wait_image(image, confidence, Deadline::After(timeout)),
            None => false,
        }
    }

    /// Like [`Element::is_visible`] but the deadline may be unbounded.
    pub fn wait_till_visible(&self, coord: &mut Coordinator, deadline: Deadline) -> bool {
        let confidence = coord.timing().confidence;
        match self.searchable_image(coord) {
            Some(image) => coord.wait_image(image, confidence, deadline),
            None => false,
        }
    }

    /// Cached location unless `live`; a live search leaves the tree untouched.
    pub fn locate(&self, coord: &Coordinator, confidence: f64, live: bool) -> Option<Point> {
        if !live {
            if let Some(location) = self.location() {
                return Some(location);
            }
        }
        match self.searchable_image(coord) {
            Some(image) => coord.locator().locate(image, confidence),
            None => {
                tracing::error!(element = %self.name(), "cannot locate an element without a usable image");
                None
            }
        }
    }

    /// Move the pointer to `location`, or to the element's own location.
    pub fn move_to(&self, coord: &mut Coordinator, location: Option<Point>) -> bool {
        let Some(target) = location.or(self.location()) else {
            tracing::error!(element = %self.name(), "no location to move to");
            return false;
        };
        match coord.move_to(target) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(element = %self.name(), error = %e, "pointer move failed");
                false
            }
        }
    }

    /// Click the element. With `walk` set every ancestor is clicked first,
    /// root first; the walk stops at the first element that cannot be clicked.
    pub fn click(&self, coord: &mut Coordinator, options: &ClickOptions) -> bool {
        if !options.walk {
            return self.click_once(coord, options);
        }
        let path = self.walk_path();
        let Some((target, ancestors)) = path.split_last() else {
            return false;
        };
        let step = options.walk_step();
        for ancestor in ancestors {
            if !ancestor.click_once(coord, &step) {
                tracing::warn!(element = %self.name(), blocked_at = %ancestor.name(), "walk interrupted");
                return false;
            }
        }
        target.click_once(coord, &ClickOptions {
            walk: false,
            ..options.clone()
        })
    }

    fn click_once(&self, coord: &mut Coordinator, options: &ClickOptions) -> bool {
        if (options.fail_safe || coord.timing().fail_safe) && coord.fail_safe_tripped() {
            return false;
        }
        coord.sleep(options.delay.unwrap_or(coord.timing().pre_click_delay));
        match &options.via {
            Via::Coordinates => match self.location() {
                Some(location) => self.click_point(coord, location + options.offset, options),
                None => {
                    tracing::debug!(element = %self.name(), "no location, searching for image");
                    self.click_image(coord, options)
                }
            },
            Via::Image => self.click_image(coord, options),
            Via::Text { needle, region } => match coord.locate_text(*region, needle) {
                Some(found) => self.click_point(coord, found + options.offset, options),
                None => {
                    tracing::warn!(element = %self.name(), needle = %needle, "text to click not found");
                    false
                }
            },
        }
    }

    fn click_point(&self, coord: &mut Coordinator, point: Point, options: &ClickOptions) -> bool {
        match coord.click_at(point, options.button, options.repeat) {
            Ok(()) => {
                tracing::debug!(element = %self.name(), point = %point, "clicked");
                true
            }
            Err(e) => {
                tracing::error!(element = %self.name(), error = %e, "click failed");
                false
            }
        }
    }

    /// Wait for the bound image to show up, then click it.
    fn click_image(&self, coord: &mut Coordinator, options: &ClickOptions) -> bool {
        let Some(image) = self.searchable_image(coord) else {
            return false;
        };
        let confidence = options.confidence.unwrap_or(coord.timing().click_confidence);
        let timeout = Deadline::After(coord.timing().visible_timeout);
        if !coord.wait_image(image, confidence, timeout) {
            tracing::error!(element = %self.name(), image = %image, "not visible and clickable");
            return false;
        }
        let target = ImageClick {
            name: image,
            offset: options.offset,
            confidence,
            button: options.button,
            repeat: options.repeat,
        };
        if coord.click_image(&target) {
            return true;
        }
        tracing::error!(element = %self.name(), "image vanished before the click");
        false
    }

    /// Focus the element with a click, then type `text` into it.
    pub fn insert(&self, coord: &mut Coordinator, text: &str, options: &InsertOptions) -> bool {
        let focus = ClickOptions::default()
            .offset(options.offset)
            .via(options.via.clone());
        if !self.click(coord, &focus) {
            tracing::warn!(element = %self.name(), "could not focus element for typing");
            return false;
        }
        match type_into(coord, text, options) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(element = %self.name(), error = %e, "typing failed");
                false
            }
        }
    }
}

fn type_into(coord: &mut Coordinator, text: &str, options: &InsertOptions) -> MarketResult<()> {
    if options.clear {
        coord.hotkey(&["ctrl", "a"])?;
    }
    coord.type_text(text, options.interval)?;
    if options.enter {
        coord.hotkey(&["enter"])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use image::RgbaImage;

    use crate::element::tree::ElementSpec;
    use crate::executor::coordinator::ClickTiming;
    use crate::perception::images::ImageRepository;
    use crate::perception::locator::{PollSettings, ScreenLocator};
    use crate::perception::types::TextFragment;
    use crate::testing::{
        noise_image, paste, FakeClock, FakeOcr, InputEvent, RecordingInput, SequenceScreen, StaticScreen,
    };

    struct Rig {
        coord: Coordinator,
        input: RecordingInput,
        clock: Arc<FakeClock>,
    }

    fn rig(frame: RgbaImage, images: ImageRepository) -> Rig {
        let input = RecordingInput::new();
        input.park_pointer(Point::new(500, 500));
        let clock = FakeClock::shared();
        let locator = ScreenLocator::new(images, Box::new(StaticScreen::new(frame)), clock.clone(), PollSettings::default());
        let coord = Coordinator::new(locator, Box::new(input.clone()), ClickTiming::default());
        Rig { coord, input, clock }
    }

    fn blank_rig() -> Rig {
        rig(noise_image(200, 120, 3, 1), ImageRepository::empty("unused"))
    }

    fn menus() -> UiTree {
        let mut tree = UiTree::new();
        tree.insert(
            None,
            ElementSpec::new("market").at(100, 100).child(
                ElementSpec::new("category")
                    .at(10, 20)
                    .child(ElementSpec::new("materials").at(5, 5)),
            ),
        )
        .unwrap();
        tree
    }

    #[test]
    fn coordinate_click_uses_location_plus_offset_after_delay() {
        let tree = menus();
        let mut rig = blank_rig();
        let el = tree.get("category").unwrap();
        assert!(el.click(&mut rig.coord, &ClickOptions::default().offset(Point::new(1, 2)).repeat(2)));
        assert_eq!(
            rig.input.events(),
            vec![
                InputEvent::Move(Point::new(111, 122)),
                InputEvent::Click {
                    at: Point::new(111, 122),
                    button: MouseButton::Left,
                    repeat: 2
                },
            ]
        );
        assert_eq!(rig.clock.elapsed(), Duration::from_millis(300));
    }

    #[test]
    fn walk_clicks_root_to_leaf() {
        let tree = menus();
        let mut rig = blank_rig();
        let leaf = tree.get("materials").unwrap();
        let options = ClickOptions::default().walk(true).button(MouseButton::Right);
        assert!(leaf.click(&mut rig.coord, &options));
        assert_eq!(
            rig.input.clicks(),
            vec![Point::new(100, 100), Point::new(110, 120), Point::new(115, 125)]
        );
        let buttons: Vec<_> = rig
            .input
            .events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Click { button, .. } => Some(button),
                _ => None,
            })
            .collect();
        assert_eq!(buttons, vec![MouseButton::Left, MouseButton::Left, MouseButton::Right]);
    }

    #[test]
    fn walk_stops_at_first_unclickable_ancestor() {
        let mut tree = UiTree::new();
        tree.insert(
            None,
            ElementSpec::new("dialog").child(ElementSpec::new("confirm").at(3, 3)),
        )
        .unwrap();
        let mut rig = blank_rig();
        let confirm = tree.get("confirm").unwrap();
        assert!(!confirm.click(&mut rig.coord, &ClickOptions::default().walk(true)));
        assert!(rig.input.clicks().is_empty());
    }

    #[test]
    fn unanchored_element_falls_back_to_image_search() {
        let template = noise_image(18, 10, 2, 40);
        let mut frame = noise_image(200, 120, 3, 1);
        paste(&mut frame, &template, 60, 70);
        let mut images = ImageRepository::empty("unused");
        images.insert("create_buy_order", template);
        let mut rig = rig(frame, images);

        let mut tree = UiTree::new();
        tree.insert(None, ElementSpec::new("create_buy_order")).unwrap();
        let el = tree.get("create_buy_order").unwrap();
        assert_eq!(el.resolve_location(), Point::ORIGIN);
        assert!(el.click(&mut rig.coord, &ClickOptions::default()));
        assert_eq!(rig.input.clicks(), vec![Point::new(69, 75)]);
    }

    #[test]
    fn image_click_waits_for_the_image_to_appear() {
        let template = noise_image(18, 10, 2, 40);
        let blank = noise_image(200, 120, 3, 1);
        let mut shown = blank.clone();
        paste(&mut shown, &template, 60, 70);
        let mut images = ImageRepository::empty("unused");
        images.insert("create_buy_order", template);
        let input = RecordingInput::new();
        input.park_pointer(Point::new(500, 500));
        let clock = FakeClock::shared();
        let screen = SequenceScreen::new(vec![blank, shown]);
        let locator = ScreenLocator::new(images, Box::new(screen), clock.clone(), PollSettings::default());
        let mut coord = Coordinator::new(locator, Box::new(input.clone()), ClickTiming::default());

        let mut tree = UiTree::new();
        tree.insert(None, ElementSpec::new("create_buy_order").at(5, 5)).unwrap();
        let el = tree.get("create_buy_order").unwrap();
        assert!(el.click(&mut coord, &ClickOptions::default().via(Via::Image)));
        assert_eq!(input.clicks(), vec![Point::new(69, 75)]);
        // Pre-click delay, one missed poll, image settle, after-click pause.
        assert_eq!(clock.elapsed(), Duration::from_millis(3300));
    }

    #[test]
    fn image_click_gives_up_after_visible_timeout() {
        let mut tree = UiTree::new();
        tree.insert(None, ElementSpec::new("orders")).unwrap();
        let mut images = ImageRepository::empty("unused");
        images.insert("orders", noise_image(20, 20, 2, 99));
        let mut rig = rig(noise_image(200, 120, 3, 1), images);
        let el = tree.get("orders").unwrap();
        assert!(!el.click(&mut rig.coord, &ClickOptions::default().via(Via::Image)));
        assert!(rig.input.clicks().is_empty());
        assert!(rig.clock.elapsed() >= Duration::from_secs(6));
    }

    #[test]
    fn image_mode_without_bound_image_reports_false() {
        let mut tree = UiTree::new();
        tree.insert(None, ElementSpec::new("price").at(513, 630).image(None))
            .unwrap();
        let mut rig = blank_rig();
        let el = tree.get("price").unwrap();
        assert!(!el.click(&mut rig.coord, &ClickOptions::default().via(Via::Image)));
        assert!(!el.is_visible(&mut rig.coord, 0.9, Duration::from_secs(1)));
        assert!(!el.is_valid(&rig.coord));
        assert!(rig.input.events().is_empty());
    }

    #[test]
    fn is_visible_respects_timeout() {
        let mut tree = UiTree::new();
        tree.insert(None, ElementSpec::new("orders").at(1, 1)).unwrap();
        let mut images = ImageRepository::empty("unused");
        images.insert("orders", noise_image(20, 20, 2, 99));
        let mut rig = rig(noise_image(200, 120, 3, 1), images);
        let el = tree.get("orders").unwrap();
        assert!(!el.is_visible(&mut rig.coord, 0.9, Duration::from_secs(2)));
        let waited = rig.clock.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited <= Duration::from_millis(2500));
    }

    #[test]
    fn text_mode_clicks_ocr_match() {
        let mut tree = UiTree::new();
        tree.insert(None, ElementSpec::new("tier").at(938, 270)).unwrap();
        let images = ImageRepository::empty("unused");
        let input = RecordingInput::new();
        input.park_pointer(Point::new(5, 5));
        let clock = FakeClock::shared();
        let fragments = vec![TextFragment {
            text: "Tier 6".into(),
            left: 10,
            top: 10,
            width: 40,
            height: 10,
            confidence: 91.0,
        }];
        let locator = ScreenLocator::new(
            images,
            Box::new(StaticScreen::new(noise_image(200, 120, 3, 1))),
            clock,
            PollSettings::default(),
        )
        .with_ocr(Box::new(FakeOcr::new(fragments)));
        let mut coord = Coordinator::new(locator, Box::new(input.clone()), ClickTiming::default());

        let via = Via::Text {
            needle: "Tier".into(),
            region: Some(Region::new(100, 50, 80, 40)),
        };
        let el = tree.get("tier").unwrap();
        assert!(el.click(&mut coord, &ClickOptions::default().via(via)));
        assert_eq!(input.clicks(), vec![Point::new(130, 65)]);
    }

    #[test]
    fn text_walk_clicks_ancestors_at_their_coordinates() {
        let tree = menus();
        let input = RecordingInput::new();
        input.park_pointer(Point::new(500, 500));
        let fragments = vec![TextFragment {
            text: "Materials".into(),
            left: 20,
            top: 30,
            width: 40,
            height: 10,
            confidence: 88.0,
        }];
        let locator = ScreenLocator::new(
            ImageRepository::empty("unused"),
            Box::new(StaticScreen::new(noise_image(200, 120, 3, 1))),
            FakeClock::shared(),
            PollSettings::default(),
        )
        .with_ocr(Box::new(FakeOcr::new(fragments)));
        let mut coord = Coordinator::new(locator, Box::new(input.clone()), ClickTiming::default());

        let via = Via::Text {
            needle: "Materials".into(),
            region: None,
        };
        let leaf = tree.get("materials").unwrap();
        assert!(leaf.click(&mut coord, &ClickOptions::default().walk(true).via(via)));
        assert_eq!(
            input.clicks(),
            vec![Point::new(100, 100), Point::new(110, 120), Point::new(40, 35)]
        );
    }

    #[test]
    fn insert_with_clear_replaces_previous_contents() {
        let tree = menus();
        let input = RecordingInput::with_field("1500000");
        input.park_pointer(Point::new(500, 500));
        let clock = FakeClock::shared();
        let locator = ScreenLocator::new(
            ImageRepository::empty("unused"),
            Box::new(StaticScreen::new(noise_image(50, 50, 3, 1))),
            clock,
            PollSettings::default(),
        );
        let mut coord = Coordinator::new(locator, Box::new(input.clone()), ClickTiming::default());

        let el = tree.get("category").unwrap();
        assert!(el.insert(&mut coord, "X", &InsertOptions::default()));
        assert_eq!(input.field(), "X");

        let options = InsertOptions {
            clear: false,
            enter: true,
            ..InsertOptions::default()
        };
        assert!(el.insert(&mut coord, "Y", &options));
        assert_eq!(input.field(), "XY");
        assert_eq!(input.events().last(), Some(&InputEvent::Keys(vec!["enter".into()])));
    }

    #[test]
    fn insert_skips_typing_when_focus_fails() {
        let mut tree = UiTree::new();
        tree.insert(None, ElementSpec::new("search").image(None)).unwrap();
        let mut rig = blank_rig();
        let el = tree.get("search").unwrap();
        assert!(!el.insert(&mut rig.coord, "cowl", &InsertOptions::default()));
        assert!(rig.input.events().is_empty());
    }

    #[test]
    fn fail_safe_blocks_click_at_origin() {
        let tree = menus();
        let mut rig = blank_rig();
        rig.input.park_pointer(Point::ORIGIN);
        let el = tree.get("market").unwrap();
        assert!(!el.click(&mut rig.coord, &ClickOptions::default().fail_safe(true)));
        assert!(rig.input.clicks().is_empty());
        assert!(el.click(&mut rig.coord, &ClickOptions::default()));
    }

    #[test]
    fn relocate_anchors_subtree_at_found_image() {
        let template = noise_image(20, 20, 2, 12);
        let mut frame = noise_image(200, 120, 3, 1);
        paste(&mut frame, &template, 30, 40);
        let mut images = ImageRepository::empty("unused");
        images.insert("market", template);
        let rig = rig(frame, images);

        let mut tree = menus();
        let market = tree.find("market").unwrap();
        assert!(tree.relocate(market, &rig.coord, 0.9));
        assert_eq!(tree.get("market").unwrap().location(), Some(Point::new(40, 50)));
        assert_eq!(tree.get("materials").unwrap().location(), Some(Point::new(55, 75)));
    }

    #[test]
    fn locate_prefers_cache_unless_live() {
        let tree = menus();
        let rig = blank_rig();
        let el = tree.get("category").unwrap();
        assert_eq!(el.locate(&rig.coord, 0.85, false), Some(Point::new(110, 120)));
        assert_eq!(el.locate(&rig.coord, 0.85, true), None);
    }
}
