//! Model-wide change containers.

use super::ChangesFrame;
use crate::error::{CoreError, CoreResult};
use crate::model::Model;
use crate::shard::Shard;
use shardgraph_storage::FrameImage;

/// The full delta of one command, undo entry or merged batch.
///
/// Holds zero or one [`ChangesFrame`] per shard, in first-touch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelChanges {
    frames: Vec<ChangesFrame>,
}

impl ModelChanges {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if any frame carries a record.
    pub fn has_changes(&self) -> bool {
        self.frames.iter().any(ChangesFrame::has_changes)
    }

    /// Total number of records.
    pub fn record_count(&self) -> usize {
        self.frames.iter().map(ChangesFrame::record_count).sum()
    }

    /// Frames in order.
    pub fn frames(&self) -> impl Iterator<Item = &ChangesFrame> {
        self.frames.iter()
    }

    /// Names of the shards with records.
    pub fn changed_shards(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.frames
            .iter()
            .filter(|frame| frame.has_changes())
            .map(ChangesFrame::shard)
    }

    /// The frame of shard `S`, if it was touched.
    pub fn frame<S: Shard>(&self) -> Option<&ChangesFrame> {
        self.frame_named(S::NAME)
    }

    /// The frame of the named shard, if it was touched.
    pub fn frame_named(&self, shard: &str) -> Option<&ChangesFrame> {
        self.frames.iter().find(|frame| frame.shard() == shard)
    }

    /// The frame of the named shard, created if absent.
    pub fn frame_entry(&mut self, shard: &'static str) -> &mut ChangesFrame {
        let index = match self.frames.iter().position(|frame| frame.shard() == shard) {
            Some(index) => index,
            None => {
                self.frames.push(ChangesFrame::new(shard));
                self.frames.len() - 1
            }
        };
        &mut self.frames[index]
    }

    /// Adds a frame, merging it into an existing frame of the same shard.
    pub(crate) fn absorb(&mut self, frame: ChangesFrame) -> CoreResult<()> {
        match self.frames.iter().position(|own| own.shard() == frame.shard()) {
            Some(index) => self.frames[index] = self.frames[index].merge(&frame)?,
            None => self.frames.push(frame),
        }
        Ok(())
    }

    /// Drops empty sets and frames.
    pub(crate) fn compact(&mut self) {
        for frame in &mut self.frames {
            frame.compact();
        }
        self.frames.retain(ChangesFrame::has_changes);
    }

    /// The changes that undo these: frames reversed, each inverted.
    #[must_use]
    pub fn invert(&self) -> Self {
        Self {
            frames: self.frames.iter().rev().map(ChangesFrame::invert).collect(),
        }
    }

    /// Folds `later` into a copy of these changes, frame by frame.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChangeSequence` if two records do not coalesce.
    pub fn merge(&self, later: &ModelChanges) -> CoreResult<Self> {
        let mut merged = self.clone();
        for frame in &later.frames {
            match merged
                .frames
                .iter()
                .position(|own| own.shard() == frame.shard())
            {
                Some(index) => merged.frames[index] = merged.frames[index].merge(frame)?,
                None => merged.frames.push(frame.clone()),
            }
        }
        merged.compact();
        Ok(merged)
    }

    /// Erased frames for persistence, using the schemas of `model`.
    ///
    /// # Errors
    ///
    /// Returns `ShardNotRegistered` or `UnknownSet` if a frame does not fit
    /// the model.
    pub fn to_images(&self, model: &Model) -> CoreResult<Vec<FrameImage>> {
        self.frames
            .iter()
            .filter(|frame| frame.has_changes())
            .map(|frame| {
                let schema = model
                    .shard_schema(frame.shard())
                    .ok_or_else(|| CoreError::shard_not_registered(frame.shard()))?;
                frame.to_image(&schema)
            })
            .collect()
    }
}
