// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `matrix` module defines the cell event model shared by every data-matrix codec: the
//! typed cell, the per-column width vector, the push handler interface, and the pull iterator
//! adapter.

use std::collections::VecDeque;

use crate::errors::{Error, Result};

/// One cell of a data matrix.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    /// A numeric cell.
    Numeric(f64),
    /// A numeric cell holding the system-missing value.
    Sysmiss,
    /// A string cell, trailing padding removed.
    Str(String),
}

/// The per-slot width vector of a matrix.
///
/// Each slot is `0` for a numeric column, `1..=255` for the head of a string column, or `-1`
/// for the continuation of a preceding string in formats that store cells in fixed 8-byte
/// units.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ColumnWidths {
    slots: Vec<i16>,
}

impl ColumnWidths {
    /// Create an empty width vector.
    pub fn new() -> ColumnWidths {
        ColumnWidths { slots: Vec::new() }
    }

    /// Create a width vector from raw slot widths.
    pub fn from_slots(slots: Vec<i16>) -> ColumnWidths {
        ColumnWidths { slots }
    }

    /// Append a numeric column.
    pub fn push_numeric(&mut self) {
        self.slots.push(0);
    }

    /// Append the head slot of a string column of the given declared width.
    pub fn push_string(&mut self, width: u8) {
        self.slots.push(i16::from(width));
    }

    /// Append a continuation slot for the preceding string column.
    pub fn push_continuation(&mut self) {
        self.slots.push(-1);
    }

    /// The raw slot widths.
    pub fn slots(&self) -> &[i16] {
        &self.slots
    }

    /// The number of slots, counting string continuations.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The number of columns, not counting string continuations.
    pub fn column_count(&self) -> usize {
        self.slots.iter().filter(|&&w| w >= 0).count()
    }

    /// Whether the vector holds no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A push consumer of matrix traversal events.
///
/// Events arrive strictly in file order: columns ascend within a row and rows ascend across
/// the matrix. Every method has a default empty body so implementations subscribe only to the
/// events they care about.
pub trait MatrixHandler {
    /// The traversal is starting.
    fn matrix_begin(
        &mut self,
        _columns: usize,
        _rows_hint: Option<usize>,
        _widths: &ColumnWidths,
    ) {
    }

    /// A row is starting.
    fn row_begin(&mut self, _y: usize) {}

    /// A numeric cell.
    fn cell_numeric(&mut self, _x: usize, _value: f64) {}

    /// A system-missing cell.
    fn cell_sysmiss(&mut self, _x: usize) {}

    /// A string cell, trailing padding removed.
    fn cell_string(&mut self, _x: usize, _text: &str) {}

    /// A cell failed to parse. The traversal stops after this event.
    fn cell_invalid(&mut self, _x: usize) {}

    /// A row is complete.
    fn row_end(&mut self, _y: usize) {}

    /// The traversal is complete.
    fn matrix_end(&mut self) {}
}

/// A pull producer of matrix cells.
///
/// Implementations are restartable: [`reset`](CellReader::reset) returns the reader to the top
/// of the matrix without reallocating internal buffers. Dropping a reader mid-traversal
/// requires no cleanup.
pub trait CellReader {
    /// The next cell in file order as `(column, row, cell)`, or `None` once the matrix is
    /// exhausted.
    fn next_cell(&mut self) -> Result<Option<(usize, usize, Cell)>>;

    /// Restart the traversal from the top of the matrix.
    fn reset(&mut self) -> Result<()>;

    /// The width vector driving this reader.
    fn widths(&self) -> &ColumnWidths;
}

/// Drives a full traversal of `reader`, translating cells into [`MatrixHandler`] events.
///
/// The reader is reset before traversal. A parse failure raises `cell_invalid` on the handler
/// and then surfaces the typed error to the caller.
pub fn dispatch_matrix<R, H>(reader: &mut R, rows_hint: Option<usize>, handler: &mut H) -> Result<()>
where
    R: CellReader + ?Sized,
    H: MatrixHandler,
{
    reader.reset()?;

    let columns = reader.widths().column_count();
    {
        let widths = reader.widths().clone();
        handler.matrix_begin(columns, rows_hint, &widths);
    }

    let mut current_row = None;

    loop {
        match reader.next_cell() {
            Ok(Some((x, y, cell))) => {
                if current_row != Some(y) {
                    if let Some(prev) = current_row {
                        handler.row_end(prev);
                    }
                    handler.row_begin(y);
                    current_row = Some(y);
                }

                match cell {
                    Cell::Numeric(value) => handler.cell_numeric(x, value),
                    Cell::Sysmiss => handler.cell_sysmiss(x),
                    Cell::Str(text) => handler.cell_string(x, &text),
                }
            }
            Ok(None) => break,
            Err(err) => {
                if let Error::InvalidCell { column, .. } = err {
                    handler.cell_invalid(column);
                }
                return Err(err);
            }
        }
    }

    if let Some(prev) = current_row {
        handler.row_end(prev);
    }
    handler.matrix_end();

    Ok(())
}

/// Adapts a [`CellReader`] into an iterator by buffering cell events in a bounded ring.
///
/// The ring holds at least one full row of cells; the underlying reader is only advanced when
/// the ring runs dry, so a slow consumer throttles the byte cursor.
pub struct Cells<R: CellReader> {
    reader: R,
    ring: VecDeque<(usize, usize, Cell)>,
    capacity: usize,
    done: bool,
}

impl<R: CellReader> Cells<R> {
    /// Create a pull iterator over the given reader.
    pub fn new(reader: R) -> Cells<R> {
        let capacity = reader.widths().column_count().max(1);
        Cells { reader, ring: VecDeque::with_capacity(capacity), capacity, done: false }
    }

    /// Unwraps this `Cells`, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn fill(&mut self) -> Result<()> {
        while !self.done && self.ring.len() < self.capacity {
            match self.reader.next_cell()? {
                Some(event) => self.ring.push_back(event),
                None => self.done = true,
            }
        }
        Ok(())
    }
}

impl<R: CellReader> Iterator for Cells<R> {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ring.is_empty() && !self.done {
            if let Err(err) = self.fill() {
                self.done = true;
                return Some(Err(err));
            }
        }

        self.ring.pop_front().map(|(_, _, cell)| Ok(cell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A canned reader yielding a fixed two-column grid.
    struct GridReader {
        widths: ColumnWidths,
        cells: Vec<(usize, usize, Cell)>,
        pos: usize,
    }

    impl GridReader {
        fn new(rows: usize) -> GridReader {
            let mut widths = ColumnWidths::new();
            widths.push_numeric();
            widths.push_string(4);

            let mut cells = Vec::new();
            for y in 0..rows {
                cells.push((0, y, Cell::Numeric(y as f64)));
                cells.push((1, y, Cell::Str(format!("r{}", y))));
            }

            GridReader { widths, cells, pos: 0 }
        }
    }

    impl CellReader for GridReader {
        fn next_cell(&mut self) -> Result<Option<(usize, usize, Cell)>> {
            let event = self.cells.get(self.pos).cloned();
            self.pos += 1;
            Ok(event)
        }

        fn reset(&mut self) -> Result<()> {
            self.pos = 0;
            Ok(())
        }

        fn widths(&self) -> &ColumnWidths {
            &self.widths
        }
    }

    #[derive(Default)]
    struct EventLog {
        events: Vec<String>,
    }

    impl MatrixHandler for EventLog {
        fn matrix_begin(&mut self, columns: usize, _: Option<usize>, _: &ColumnWidths) {
            self.events.push(format!("begin {}", columns));
        }

        fn row_begin(&mut self, y: usize) {
            self.events.push(format!("row {}", y));
        }

        fn cell_numeric(&mut self, x: usize, value: f64) {
            self.events.push(format!("num {} {}", x, value));
        }

        fn cell_string(&mut self, x: usize, text: &str) {
            self.events.push(format!("str {} {}", x, text));
        }

        fn row_end(&mut self, y: usize) {
            self.events.push(format!("end {}", y));
        }

        fn matrix_end(&mut self) {
            self.events.push("done".to_string());
        }
    }

    #[test]
    fn verify_dispatch_order() {
        let mut reader = GridReader::new(2);
        let mut log = EventLog::default();

        dispatch_matrix(&mut reader, Some(2), &mut log).unwrap();

        assert_eq!(
            log.events,
            vec![
                "begin 2", "row 0", "num 0 0", "str 1 r0", "end 0", "row 1", "num 0 1",
                "str 1 r1", "end 1", "done",
            ]
        );
    }

    #[test]
    fn verify_cells_iterator() {
        let cells: Vec<Cell> =
            Cells::new(GridReader::new(3)).collect::<Result<_>>().unwrap();

        assert_eq!(cells.len(), 6);
        assert_eq!(cells[0], Cell::Numeric(0.0));
        assert_eq!(cells[5], Cell::Str("r2".to_string()));
    }

    #[test]
    fn verify_column_widths_counts() {
        let mut widths = ColumnWidths::new();
        widths.push_numeric();
        widths.push_string(11);
        widths.push_continuation();
        widths.push_numeric();

        assert_eq!(widths.slot_count(), 4);
        assert_eq!(widths.column_count(), 3);
    }
}
