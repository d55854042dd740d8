//! crates/quiz_engine_core/src/engine/levels.rs
//!
//! Level catalog and administrative level management: listing, repositioning,
//! soft deletion, and saving a level together with its category set.

use std::collections::HashSet;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    Category, Game, GameSession, ImageChange, Level, LevelDraft, LevelOverview, LevelState,
};
use crate::error::{EngineError, EngineResult};
use crate::ports::PortError;

use super::{ensure_level_in_game, GameEngine, MAX_PERSIST_RETRIES};

impl GameEngine {
    /// The game's active levels, each annotated with the session's attempt
    /// for that level (if a session is given).
    ///
    /// Without a session the levels come in catalog position order; with a
    /// session they follow the session's fixed level order, which is
    /// invariant under later reordering or deletion.
    pub async fn list_levels(
        &self,
        game: &Game,
        session: Option<&GameSession>,
    ) -> EngineResult<Vec<LevelOverview>> {
        let levels = self.store.active_levels(game.id).await?;
        let ordered: Vec<Level> = match session {
            None => levels,
            Some(session) => session
                .level_order
                .iter()
                .filter_map(|id| levels.iter().find(|level| level.id == *id).cloned())
                .collect(),
        };
        let mut overviews = Vec::with_capacity(ordered.len());
        for level in ordered {
            let question = match session {
                Some(session) => self.store.question_for_level(session.id, level.id).await?,
                None => None,
            };
            overviews.push(LevelOverview { level, question });
        }
        Ok(overviews)
    }

    /// The categories a level draws its questions from.
    pub async fn level_categories(
        &self,
        game: &Game,
        user_id: Uuid,
        level_id: Uuid,
    ) -> EngineResult<Vec<Category>> {
        self.ensure_can_manage(game, user_id).await?;
        let level = self.store.get_level(level_id).await?;
        ensure_level_in_game(&level, game)?;
        Ok(self.store.categories_for_level(level.id).await?)
    }

    /// Swaps the level with its neighbor at `position + delta`.
    ///
    /// Returns `false` (a no-op, not an error) when there is no neighbor in
    /// that direction. `delta` must be 1 or -1.
    ///
    /// Two rows change in one logical step. When a concurrent writer wins
    /// the version check on either row, the first write is rolled back and
    /// the whole swap is retried from fresh reads, so the dense-position
    /// invariant holds even mid-failure.
    pub async fn swap_level_position(
        &self,
        game: &Game,
        user_id: Uuid,
        level_id: Uuid,
        delta: i32,
    ) -> EngineResult<bool> {
        self.ensure_can_manage(game, user_id).await?;
        if delta != 1 && delta != -1 {
            return Err(EngineError::Validation(format!(
                "delta value is invalid (is {} but must be 1 or -1)",
                delta
            )));
        }

        for _ in 0..MAX_PERSIST_RETRIES {
            let level = self.store.get_level(level_id).await?;
            ensure_level_in_game(&level, game)?;

            let target = i64::from(level.position) + i64::from(delta);
            if target < 0 {
                return Ok(false);
            }
            let other = self
                .store
                .active_level_by_position(game.id, target as u32)
                .await?;
            let Some(other) = other else {
                return Ok(false);
            };

            let mut first = level;
            let mut second = other;
            std::mem::swap(&mut first.position, &mut second.position);
            let first = match self.store.update_level(&first).await {
                Ok(saved) => saved,
                Err(PortError::Conflict(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            match self.store.update_level(&second).await {
                Ok(_) => {
                    debug!(level = %first.id, other = %second.id, "swapped level positions");
                    return Ok(true);
                }
                Err(PortError::Conflict(_)) => {
                    // Put the first row back before retrying so no two
                    // active levels share a position in the meantime.
                    let mut rollback = first;
                    rollback.position = second.position;
                    self.store.update_level(&rollback).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        warn!(level = %level_id, "level position swap kept conflicting");
        Err(EngineError::Port(PortError::Conflict(format!(
            "level {} position swap retries exhausted",
            level_id
        ))))
    }

    /// Soft-deletes the level and recomputes the positions of the remaining
    /// active levels to a dense 0..N-1 sequence, preserving their relative
    /// order.
    pub async fn delete_level(
        &self,
        game: &Game,
        user_id: Uuid,
        level_id: Uuid,
    ) -> EngineResult<bool> {
        self.ensure_can_manage(game, user_id).await?;
        let mut level = self.store.get_level(level_id).await?;
        ensure_level_in_game(&level, game)?;
        if !level.is_active() {
            return Ok(true);
        }
        level.state = LevelState::Deleted;
        self.store.update_level(&level).await?;
        self.fix_level_positions(game.id).await?;
        info!(level = %level.id, game = %game.id, "soft-deleted level");
        Ok(true)
    }

    /// Creates or updates a level, applies the artwork change, and
    /// reconciles the category set: stored categories missing from the
    /// payload are deleted, payload categories are upserted, and untouched
    /// categories keep their identity.
    pub async fn save_level(
        &self,
        game: &Game,
        user_id: Uuid,
        draft: LevelDraft,
    ) -> EngineResult<Level> {
        self.ensure_can_manage(game, user_id).await?;
        let mut level = match draft.id {
            Some(id) => {
                let mut existing = self.store.get_level(id).await?;
                ensure_level_in_game(&existing, game)?;
                existing.name = draft.name;
                existing.bg_color = draft.bg_color;
                self.store.update_level(&existing).await?
            }
            None => {
                // New levels are appended at the end of the sequence.
                let position = self.store.active_levels(game.id).await?.len() as u32;
                let level = Level {
                    id: Uuid::new_v4(),
                    game_id: game.id,
                    position,
                    name: draft.name,
                    bg_color: draft.bg_color,
                    image: None,
                    state: LevelState::Active,
                    version: 0,
                };
                self.store.insert_level(level).await?
            }
        };

        match draft.image {
            ImageChange::Keep => {}
            ImageChange::Clear => {
                if let Some(filename) = level.image.take() {
                    self.images.delete_level_image(level.id, &filename).await?;
                    level = self.store.update_level(&level).await?;
                }
            }
            ImageChange::Upload { mime_type, content } => {
                let filename = self
                    .images
                    .store_level_image(level.id, &mime_type, &content)
                    .await?;
                level.image = Some(filename);
                level = self.store.update_level(&level).await?;
            }
        }

        self.save_categories(&level, draft.categories).await?;
        info!(level = %level.id, game = %game.id, "saved level");
        Ok(level)
    }

    async fn save_categories(
        &self,
        level: &Level,
        drafts: Vec<crate::domain::CategoryDraft>,
    ) -> EngineResult<()> {
        let existing = self.store.categories_for_level(level.id).await?;
        let desired_ids: HashSet<Uuid> = drafts.iter().filter_map(|draft| draft.id).collect();

        for category in existing.iter().filter(|c| !desired_ids.contains(&c.id)) {
            self.store.delete_category(category.id).await?;
        }
        for draft in drafts {
            match draft.id {
                Some(id) if existing.iter().any(|c| c.id == id) => {
                    let category = Category {
                        id,
                        level_id: level.id,
                        category_ref: draft.category_ref,
                        include_subcategories: draft.include_subcategories,
                    };
                    self.store.update_category(&category).await?;
                }
                _ => {
                    let category = Category {
                        id: Uuid::new_v4(),
                        level_id: level.id,
                        category_ref: draft.category_ref,
                        include_subcategories: draft.include_subcategories,
                    };
                    self.store.insert_category(category).await?;
                }
            }
        }
        Ok(())
    }

    /// Restores the dense-position invariant after a soft deletion.
    async fn fix_level_positions(&self, game_id: Uuid) -> EngineResult<()> {
        let levels = self.store.active_levels(game_id).await?;
        for (index, level) in levels.into_iter().enumerate() {
            let index = index as u32;
            if level.position != index {
                let mut moved = level;
                moved.position = index;
                self.store.update_level(&moved).await?;
            }
        }
        Ok(())
    }
}
