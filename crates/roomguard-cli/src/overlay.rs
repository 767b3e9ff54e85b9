//! Frame annotations and where they are shown.
//!
//! There is no window: `SnapshotDisplay` writes the annotated frame to an
//! image file each iteration, `LogDisplay` only traces the annotations.

use image::{Rgb, RgbImage};
use roomguard_core::BoundingBox;
use roomguard_hw::Frame;
use std::path::PathBuf;
use thiserror::Error;

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const LINE_WIDTH: u32 = 2;
const STATUS_BAR_HEIGHT: u32 = 8;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("frame buffer does not match {width}x{height}")]
    BadFrame { width: u32, height: u32 },
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Authorized,
    Unauthorized,
    Info,
}

impl Tone {
    fn color(self) -> Rgb<u8> {
        match self {
            Tone::Authorized => GREEN,
            Tone::Unauthorized => RED,
            Tone::Info => WHITE,
        }
    }
}

/// Pixel rectangle clamped to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Clamp a detector box to a `frame_w`×`frame_h` frame; `None` if nothing is left.
    pub fn from_bbox(bbox: &BoundingBox, frame_w: u32, frame_h: u32) -> Option<Self> {
        let x0 = bbox.x.max(0.0).min(frame_w as f32) as u32;
        let y0 = bbox.y.max(0.0).min(frame_h as f32) as u32;
        let x1 = (bbox.x + bbox.width).max(0.0).min(frame_w as f32) as u32;
        let y1 = (bbox.y + bbox.height).max(0.0).min(frame_h as f32) as u32;
        (x1 > x0 && y1 > y0).then_some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// One label, optionally attached to a face box.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub region: Option<BoundingBox>,
    pub label: String,
    pub tone: Tone,
}

impl Annotation {
    pub fn banner(label: impl Into<String>, tone: Tone) -> Self {
        Self {
            region: None,
            label: label.into(),
            tone,
        }
    }

    pub fn face(bbox: BoundingBox, label: impl Into<String>, tone: Tone) -> Self {
        Self {
            region: Some(bbox),
            label: label.into(),
            tone,
        }
    }
}

/// Where annotated frames go.
pub trait Display {
    fn show(&mut self, frame: &Frame, annotations: &[Annotation]) -> Result<(), DisplayError>;
}

/// Traces annotations and nothing else.
pub struct LogDisplay;

impl Display for LogDisplay {
    fn show(&mut self, frame: &Frame, annotations: &[Annotation]) -> Result<(), DisplayError> {
        for a in annotations {
            tracing::debug!(seq = frame.sequence, label = %a.label, tone = ?a.tone, "overlay");
        }
        Ok(())
    }
}

/// Overwrites one image file with the latest annotated frame.
pub struct SnapshotDisplay {
    path: PathBuf,
}

impl SnapshotDisplay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Display for SnapshotDisplay {
    fn show(&mut self, frame: &Frame, annotations: &[Annotation]) -> Result<(), DisplayError> {
        let image = render(frame, annotations)?;
        image.save(&self.path)?;
        LogDisplay.show(frame, annotations)
    }
}

/// Grayscale frame to RGB with face boxes outlined and a status bar on top
/// coloured by the most severe tone.
pub fn render(frame: &Frame, annotations: &[Annotation]) -> Result<RgbImage, DisplayError> {
    let (w, h) = (frame.width, frame.height);
    if frame.data.len() < (w as usize) * (h as usize) {
        return Err(DisplayError::BadFrame { width: w, height: h });
    }

    let mut image = RgbImage::from_fn(w, h, |x, y| {
        let v = frame.data[(y * w + x) as usize];
        Rgb([v, v, v])
    });

    for a in annotations {
        if let Some(rect) = a.region.as_ref().and_then(|b| Rect::from_bbox(b, w, h)) {
            outline(&mut image, rect, a.tone.color());
        }
    }

    let status = if annotations.iter().any(|a| a.tone == Tone::Unauthorized) {
        Some(Tone::Unauthorized)
    } else if annotations.iter().any(|a| a.tone == Tone::Authorized) {
        Some(Tone::Authorized)
    } else {
        None
    };
    if let Some(tone) = status {
        for y in 0..STATUS_BAR_HEIGHT.min(h) {
            for x in 0..w {
                image.put_pixel(x, y, tone.color());
            }
        }
    }

    Ok(image)
}

fn outline(image: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
    let (x1, y1) = (rect.x + rect.width - 1, rect.y + rect.height - 1);
    for y in rect.y..=y1 {
        for x in rect.x..=x1 {
            let edge = x < rect.x + LINE_WIDTH
                || y < rect.y + LINE_WIDTH
                || x + LINE_WIDTH > x1
                || y + LINE_WIDTH > y1;
            if edge {
                image.put_pixel(x, y, color);
            }
        }
    }
}
