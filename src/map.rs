// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 360 Eye map reassembly.
//!
//! The robot sends its map as tiles: `MAP-GRID` places a tile on the global
//! map, `MAP-DATA` carries its content and `MAP-GLOBAL` closes a revision.
//! [`MapAssembler`] collects tiles per cleaning session and yields an
//! immutable [`AssembledMap`] once every announced tile has arrived.
//!
//! Tile counts are not always reliable, so a session that stays incomplete
//! for longer than the fallback window is published once as a partial map.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::telemetry::{MapContent, MapData, MapGlobal, MapGrid};

/// Most tiles held while waiting for their grid announcement.
const MAX_PARKED: usize = 64;

/// Position of a tile on the global map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridCoordinate {
    /// Horizontal index.
    pub x: i32,
    /// Vertical index.
    pub y: i32,
}

impl GridCoordinate {
    /// Creates a coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// One tile of a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapChunk {
    /// Cleaning session the tile belongs to.
    pub clean_id: String,
    /// Tile position.
    pub coordinate: GridCoordinate,
    /// Tile content.
    pub payload: MapContent,
}

/// A map published by the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMap {
    /// Cleaning session.
    pub clean_id: String,
    /// Tiles by position.
    pub tiles: BTreeMap<GridCoordinate, MapContent>,
    /// `false` for a best-effort map published after the fallback window.
    pub complete: bool,
    /// Tile count announced for the revision, if known.
    pub expected: Option<usize>,
}

#[derive(Debug)]
struct Session {
    clean_id: String,
    tiles: BTreeMap<GridCoordinate, MapContent>,
    expected: Option<usize>,
    grids: HashMap<String, GridCoordinate>,
    parked: HashMap<String, MapContent>,
    first_chunk: Option<Instant>,
    dirty: bool,
    published_complete: bool,
    fallback_sent: bool,
}

impl Session {
    fn new(clean_id: String) -> Self {
        Self {
            clean_id,
            tiles: BTreeMap::new(),
            expected: None,
            grids: HashMap::new(),
            parked: HashMap::new(),
            first_chunk: None,
            dirty: false,
            published_complete: false,
            fallback_sent: false,
        }
    }

    fn store(&mut self, coordinate: GridCoordinate, payload: MapContent, now: Instant) {
        self.first_chunk.get_or_insert(now);
        if self.tiles.get(&coordinate) != Some(&payload) {
            self.tiles.insert(coordinate, payload);
            self.dirty = true;
        }
    }

    fn is_complete(&self) -> bool {
        self.expected.is_some_and(|n| n > 0 && self.tiles.len() >= n)
    }

    fn snapshot(&self, complete: bool) -> AssembledMap {
        AssembledMap {
            clean_id: self.clean_id.clone(),
            tiles: self.tiles.clone(),
            complete,
            expected: self.expected,
        }
    }
}

/// Collects map tiles for the current cleaning session.
#[derive(Debug)]
pub struct MapAssembler {
    session: Option<Session>,
    last: Option<Arc<AssembledMap>>,
    fallback: Duration,
}

impl MapAssembler {
    /// Creates an assembler with the given partial-map fallback window.
    #[must_use]
    pub fn new(fallback: Duration) -> Self {
        Self {
            session: None,
            last: None,
            fallback,
        }
    }

    /// Starts a new session, dropping any tiles collected so far.
    ///
    /// The last published map is kept.
    pub fn reset(&mut self, clean_id: impl Into<String>) {
        let clean_id = clean_id.into();
        tracing::debug!(clean_id = %clean_id, "Starting map session");
        self.session = Some(Session::new(clean_id));
    }

    /// Returns the clean id of the current session.
    #[must_use]
    pub fn clean_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.clean_id.as_str())
    }

    /// Sets the number of tiles the current revision of `clean_id` holds.
    pub fn expect_total(&mut self, clean_id: &str, total: usize) -> Option<Arc<AssembledMap>> {
        let session = self.session_for(clean_id)?;
        session.expected = Some(total);
        self.publish_if_complete()
    }

    /// Stores a tile. Tiles for another session are discarded.
    pub fn insert(&mut self, chunk: MapChunk, now: Instant) -> Option<Arc<AssembledMap>> {
        let session = self.session_for(&chunk.clean_id)?;
        session.store(chunk.coordinate, chunk.payload, now);
        self.publish_if_complete()
    }

    /// Handles a `MAP-GRID` announcement.
    pub fn register_grid(&mut self, grid: &MapGrid, now: Instant) -> Option<Arc<AssembledMap>> {
        let Some(anchor) = grid.anchor else {
            tracing::warn!(grid_id = %grid.grid_id, "Map grid without anchor ignored");
            return None;
        };
        let coordinate = GridCoordinate::new(anchor.x, anchor.y);

        let session = self.session_for(&grid.clean_id)?;
        session.grids.insert(grid.grid_id.clone(), coordinate);
        if let Some(payload) = session.parked.remove(&grid.grid_id) {
            session.store(coordinate, payload, now);
        }
        self.publish_if_complete()
    }

    /// Handles a `MAP-DATA` tile. Content for an unannounced grid is parked.
    pub fn insert_data(&mut self, data: &MapData, now: Instant) -> Option<Arc<AssembledMap>> {
        let session = self.session_for(&data.clean_id)?;
        match session.grids.get(&data.grid_id).copied() {
            Some(coordinate) => {
                session.store(coordinate, data.data.clone(), now);
                self.publish_if_complete()
            }
            None if session.parked.len() >= MAX_PARKED
                && !session.parked.contains_key(&data.grid_id) =>
            {
                tracing::warn!(grid_id = %data.grid_id, "Too much unannounced map data, dropping tile");
                None
            }
            None => {
                tracing::debug!(grid_id = %data.grid_id, "Parking map data until its grid is announced");
                session.parked.insert(data.grid_id.clone(), data.data.clone());
                None
            }
        }
    }

    /// Handles `MAP-GLOBAL`: the revision holds every announced grid.
    pub fn close_revision(&mut self, global: &MapGlobal) -> Option<Arc<AssembledMap>> {
        let total = self
            .session
            .as_ref()
            .filter(|s| s.clean_id == global.clean_id)?
            .grids
            .len();
        self.expect_total(&global.clean_id, total)
    }

    /// Publishes the partial map once the fallback window has passed.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<Arc<AssembledMap>> {
        let session = self.session.as_mut()?;
        let started = session.first_chunk?;
        if session.published_complete
            || session.fallback_sent
            || now.duration_since(started) < self.fallback
        {
            return None;
        }

        session.fallback_sent = true;
        session.dirty = false;
        session.parked.clear();
        tracing::warn!(
            clean_id = %session.clean_id,
            tiles = session.tiles.len(),
            "Map incomplete after fallback window, publishing partial map"
        );
        let map = Arc::new(session.snapshot(false));
        self.last = Some(Arc::clone(&map));
        Some(map)
    }

    /// Returns the last published map, which outlives its session.
    #[must_use]
    pub fn last_map(&self) -> Option<Arc<AssembledMap>> {
        self.last.clone()
    }

    fn session_for(&mut self, clean_id: &str) -> Option<&mut Session> {
        let session = self
            .session
            .get_or_insert_with(|| Session::new(clean_id.to_string()));
        if session.clean_id == clean_id {
            Some(session)
        } else {
            tracing::debug!(
                clean_id = %clean_id,
                current = %session.clean_id,
                "Discarding map message for stale session"
            );
            None
        }
    }

    fn publish_if_complete(&mut self) -> Option<Arc<AssembledMap>> {
        let session = self.session.as_mut()?;
        if !session.dirty || !session.is_complete() {
            return None;
        }

        session.dirty = false;
        session.published_complete = true;
        tracing::debug!(clean_id = %session.clean_id, tiles = session.tiles.len(), "Map assembled");
        let map = Arc::new(session.snapshot(true));
        self.last = Some(Arc::clone(&map));
        Some(map)
    }
}

impl Default for MapAssembler {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
