//! Multi-Result Cursor.
//!
//! A command returning several grids is read through a [`MultiResult`]:
//! each [`read`](MultiResult::read) maps the current grid to one type, and
//! the grids are visited strictly in order.

use crate::identity::QueryIdentity;
use crate::mapper::SqlMapper;
use sqlmapper_core::error::StateErrorKind;
use sqlmapper_core::{Deserializer, Error, FromRow, Result, RowReader, TypeTag};
use std::fmt;
use std::iter::FusedIterator;

/// Result tag of the identity a multi-result command is cached under.
pub(crate) struct Grids;

/// Cursor over the grids of one command.
///
/// Disposed when the last grid has been advanced past, when
/// [`dispose`](Self::dispose) is called, or on drop.
pub struct MultiResult<'m, R: RowReader> {
    mapper: &'m SqlMapper,
    reader: Option<R>,
    identity: QueryIdentity,
    grid: usize,
    consumed: bool,
}

impl<R: RowReader> fmt::Debug for MultiResult<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiResult")
            .field("sql", &self.identity.sql())
            .field("grid", &self.grid)
            .field("consumed", &self.consumed)
            .field("disposed", &self.reader.is_none())
            .finish()
    }
}

impl<'m, R: RowReader> MultiResult<'m, R> {
    pub(crate) fn new(mapper: &'m SqlMapper, reader: R, identity: QueryIdentity) -> Self {
        Self {
            mapper,
            reader: Some(reader),
            identity,
            grid: 0,
            consumed: false,
        }
    }

    /// Map the rows of the current grid to `T`.
    ///
    /// The grid advances once the returned rows have been iterated and
    /// dropped. Reading the same grid twice is an error.
    pub fn read<T: FromRow>(&mut self) -> Result<GridRows<'_, 'm, R, T>> {
        let Some(reader) = self.reader.as_ref() else {
            return Err(Error::state(
                StateErrorKind::Disposed,
                "The reader has been disposed; this can happen after all data has been consumed",
            ));
        };
        if self.consumed {
            return Err(Error::state(
                StateErrorKind::GridConsumed,
                "Each grid can only be iterated once",
            ));
        }

        let identity = self.identity.for_grid(Some(TypeTag::of::<T>()), self.grid);
        let info = self.mapper.queries.get_or_create(&identity);
        let deserializer = self.mapper.deserializer::<T>(&info, &reader.columns())?;
        self.consumed = true;
        Ok(GridRows {
            multi: self,
            identity,
            deserializer,
            started: false,
            done: false,
        })
    }

    /// Index of the current grid.
    pub fn grid(&self) -> usize {
        self.grid
    }

    pub fn is_disposed(&self) -> bool {
        self.reader.is_none()
    }

    /// Release the reader. Idempotent.
    pub fn dispose(&mut self) {
        if self.reader.take().is_some() {
            tracing::trace!(sql = self.identity.sql(), grid = self.grid, "Disposed multi-result reader");
        }
    }

    fn advance(&mut self) {
        let Some(reader) = self.reader.as_mut() else {
            return;
        };
        match reader.next_result() {
            Ok(true) => {
                self.grid += 1;
                self.consumed = false;
            }
            Ok(false) => self.dispose(),
            Err(e) => {
                tracing::warn!(error = %e, grid = self.grid, "Failed to advance to the next grid");
                self.dispose();
            }
        }
    }
}

impl<R: RowReader> Drop for MultiResult<'_, R> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Lazily deserialized rows of one grid.
pub struct GridRows<'g, 'm, R: RowReader, T> {
    multi: &'g mut MultiResult<'m, R>,
    identity: QueryIdentity,
    deserializer: Deserializer<T>,
    started: bool,
    done: bool,
}

impl<R: RowReader, T> fmt::Debug for GridRows<'_, '_, R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridRows")
            .field("grid", &self.identity.grid())
            .field("started", &self.started)
            .field("done", &self.done)
            .finish()
    }
}

impl<R: RowReader, T> Iterator for GridRows<'_, '_, R, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.started = true;
        let Some(reader) = self.multi.reader.as_mut() else {
            self.done = true;
            return None;
        };
        match reader.read() {
            Ok(Some(row)) => {
                let item = self.deserializer.deserialize(&row);
                if item.is_err() {
                    // Recompiled on the next read of this grid shape.
                    self.multi.mapper.queries.delete(&self.identity);
                    self.done = true;
                }
                Some(item)
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: RowReader, T> FusedIterator for GridRows<'_, '_, R, T> {}

impl<R: RowReader, T> Drop for GridRows<'_, '_, R, T> {
    fn drop(&mut self) {
        if self.started {
            self.multi.advance();
        }
    }
}
