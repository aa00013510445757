//! Lazy typed row iterators.

use sqlmapper_core::{Deserializer, Result, RowReader};
use std::fmt;
use std::iter::FusedIterator;

/// Rows of one result grid, deserialized as they are pulled.
///
/// The reader is released as soon as the grid is exhausted or an error is
/// yielded; after an error the iterator is fused. Rows already yielded stay
/// valid.
pub struct Rows<R, T> {
    reader: Option<R>,
    deserializer: Deserializer<T>,
}

impl<R: RowReader, T> Rows<R, T> {
    pub(crate) fn new(reader: R, deserializer: Deserializer<T>) -> Self {
        Self {
            reader: Some(reader),
            deserializer,
        }
    }

    /// Whether the underlying reader has been released.
    pub fn is_finished(&self) -> bool {
        self.reader.is_none()
    }
}

impl<R, T> fmt::Debug for Rows<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows")
            .field("finished", &self.reader.is_none())
            .field("deserializer", &self.deserializer)
            .finish()
    }
}

impl<R: RowReader, T> Iterator for Rows<R, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        let item = match reader.read() {
            Ok(Some(row)) => self.deserializer.deserialize(&row),
            Ok(None) => {
                self.reader = None;
                return None;
            }
            Err(e) => Err(e),
        };
        if item.is_err() {
            self.reader = None;
        }
        Some(item)
    }
}

impl<R: RowReader, T> FusedIterator for Rows<R, T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmapper_core::{ColumnInfo, Error, Row, Value};
    use std::collections::VecDeque;
    use std::sync::Arc;

    struct Canned {
        rows: VecDeque<Value>,
    }

    impl RowReader for Canned {
        fn columns(&self) -> Arc<ColumnInfo> {
            Arc::new(ColumnInfo::new(vec!["v".into()]))
        }

        fn read(&mut self) -> Result<Option<Row>> {
            Ok(self
                .rows
                .pop_front()
                .map(|v| Row::new(vec!["v".into()], vec![v])))
        }

        fn next_result(&mut self) -> Result<bool> {
            Ok(false)
        }
    }

    fn rows(values: Vec<Value>) -> Rows<Canned, i32> {
        let deserializer = Deserializer::new(|row: &Row| match row.get(0) {
            Some(Value::Int(v)) => Ok(*v),
            _ => Err(Error::Custom("not an int".into())),
        });
        Rows::new(
            Canned {
                rows: values.into(),
            },
            deserializer,
        )
    }

    #[test]
    fn test_yields_then_releases() {
        let mut it = rows(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(it.next().unwrap().unwrap(), 1);
        assert!(!it.is_finished());
        assert_eq!(it.next().unwrap().unwrap(), 2);
        assert!(it.next().is_none());
        assert!(it.is_finished());
    }

    #[test]
    fn test_fused_after_error() {
        let mut it = rows(vec![Value::Int(1), Value::Null, Value::Int(3)]);
        assert_eq!(it.next().unwrap().unwrap(), 1);
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
        assert!(it.is_finished());
    }
}
