use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Absolute or relative screen position in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Point::new(x, y)
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Point::new(x, y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl FromStr for Point {
    type Err = String;

    /// Parses `"x,y"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = parse_ints(s)?;
        match parts.as_slice() {
            [x, y] => Ok(Point::new(*x, *y)),
            _ => Err(format!("expected `x,y`, got `{s}`")),
        }
    }
}

/// Rectangular screen area, top-left anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl FromStr for Region {
    type Err = String;

    /// Parses `"x,y,width,height"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = parse_ints(s)?;
        match parts.as_slice() {
            [x, y, w, h] if *w > 0 && *h > 0 => Ok(Region::new(*x, *y, *w as u32, *h as u32)),
            _ => Err(format!("expected `x,y,width,height` with a positive size, got `{s}`")),
        }
    }
}

fn parse_ints(s: &str) -> Result<Vec<i32>, String> {
    s.split(',')
        .map(|p| {
            p.trim()
                .parse::<i32>()
                .map_err(|e| format!("invalid number `{}`: {e}", p.trim()))
        })
        .collect()
}

/// One word or line recognized by OCR, in the coordinates of the OCR input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

impl TextFragment {
    pub fn center(&self) -> Point {
        Point::new(
            self.left + (self.width / 2) as i32,
            self.top + (self.height / 2) as i32,
        )
    }
}

/// Best template match found on a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchCandidate {
    /// Top-left corner of the matched window.
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// Normalized correlation score, 1.0 is a perfect match.
    pub score: f64,
}

impl MatchCandidate {
    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.width / 2) as i32,
            (self.top + self.height / 2) as i32,
        )
    }
}
