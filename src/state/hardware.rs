//! Live hardware status: coin magazines and the camera feed.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::protocol::{CarouselControl, MagazineFrame, OptionsList, RequestOutcome};

use super::connection::Frame;
use super::game::FrameError;
use super::notice::RequestFailure;

/// Default number of camera views in the carousel.
pub const DEFAULT_CAROUSEL_LEN: usize = 5;

/// Emptiness of each physical coin magazine, in magazine order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagazineStatus {
    empty: Vec<bool>,
}

impl MagazineStatus {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: MagazineFrame = serde_json::from_str(text)?;
        Ok(Self::from(frame))
    }

    pub fn is_empty(&self, magazine: usize) -> Option<bool> {
        self.empty.get(magazine).copied()
    }

    pub fn any_empty(&self) -> bool {
        self.empty.iter().any(|&e| e)
    }

    /// 1-based numbers of the empty magazines.
    pub fn empty_magazines(&self) -> impl Iterator<Item = usize> + '_ {
        self.empty
            .iter()
            .enumerate()
            .filter(|(_, e)| **e)
            .map(|(i, _)| i + 1)
    }
}

impl From<MagazineFrame> for MagazineStatus {
    fn from(frame: MagazineFrame) -> Self {
        Self {
            empty: vec![!frame.magazine1_full, !frame.magazine2_full],
        }
    }
}

/// Camera carousel position and the latest image.
#[derive(Debug, Clone)]
pub struct CameraView {
    carousel_len: usize,
    index: usize,
    latest_frame: Option<Vec<u8>>,
    pub frames_received: u64,
}

impl CameraView {
    pub fn new(carousel_len: usize) -> Self {
        Self {
            carousel_len: carousel_len.max(1),
            index: 0,
            latest_frame: None,
            frames_received: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn carousel_len(&self) -> usize {
        self.carousel_len
    }

    pub fn latest_frame(&self) -> Option<&[u8]> {
        self.latest_frame.as_deref()
    }

    pub fn next(&mut self) -> usize {
        self.index = (self.index + 1) % self.carousel_len;
        self.index
    }

    pub fn prev(&mut self) -> usize {
        self.index = (self.index + self.carousel_len - 1) % self.carousel_len;
        self.index
    }

    /// `{"carousel_index": n}` for the current position.
    pub fn control_frame(&self) -> Frame {
        let control = CarouselControl {
            carousel_index: self.index,
        };
        Frame::Text(serde_json::json!(control).to_string())
    }

    pub fn on_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Binary(bytes) => {
                self.frames_received += 1;
                self.latest_frame = Some(bytes);
            }
            Frame::Text(text) => {
                debug!(len = text.len(), "ignoring text frame on camera feed");
            }
        }
    }

    /// Drop the image when the feed is torn down.
    pub fn clear(&mut self) {
        self.latest_frame = None;
    }
}

/// Camera processing toggles, updated optimistically.
#[derive(Debug, Default)]
pub struct CameraOptions {
    options: OptionsList,
    fetch_seq: Option<u64>,

    /// In-flight toggles: seq -> (label, value before the toggle)
    toggles: HashMap<u64, (String, bool)>,
}

impl CameraOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &OptionsList {
        &self.options
    }

    pub fn get(&self, label: &str) -> Option<bool> {
        self.options.get(label).copied()
    }

    pub fn owns(&self, seq: u64) -> bool {
        self.fetch_seq == Some(seq) || self.toggles.contains_key(&seq)
    }

    pub fn begin_fetch(&mut self, seq: u64) {
        self.fetch_seq = Some(seq);
    }

    /// Flip `label` locally and remember how to undo it. Returns the new value.
    pub fn begin_toggle(&mut self, seq: u64, label: &str) -> Option<bool> {
        let current = self.options.get_mut(label)?;
        let previous = *current;
        *current = !previous;
        self.toggles.insert(seq, (label.to_string(), previous));
        Some(!previous)
    }

    pub fn complete(&mut self, seq: u64, outcome: &RequestOutcome) {
        if self.fetch_seq == Some(seq) {
            self.fetch_seq = None;
            match RequestFailure::classify(outcome)
                .map_err(|f| f.to_string())
                .and_then(|body| serde_json::from_str::<OptionsList>(&body).map_err(|e| e.to_string()))
            {
                Ok(options) => self.options = options,
                Err(reason) => warn!(%reason, "could not load camera options"),
            }
            return;
        }

        if let Some((label, previous)) = self.toggles.remove(&seq) {
            if let Err(failure) = RequestFailure::classify(outcome) {
                warn!(%label, %failure, "camera option update failed; reverting");
                self.options.insert(label, previous);
            }
        }
    }
}
