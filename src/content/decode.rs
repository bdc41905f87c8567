use std::fmt;
use std::ops::ControlFlow;

use serde::de::{DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};

use super::record::Record;

/// Positions a JSON document stream at the array bound to a target
/// top-level key and hands each element to `sink` as it is decoded.
///
/// Attributes other than the target are skipped without buffering their
/// values, whether they come before or after the array. When the key
/// appears more than once, the first occurrence wins. The sink may stop
/// the stream early by returning `ControlFlow::Break`, which surfaces as
/// a decode error to the caller.
pub(crate) struct ArrayStream<'a, F> {
    key: &'a str,
    sink: F,
}

impl<'a, F> ArrayStream<'a, F>
where
    F: FnMut(Record) -> ControlFlow<()>,
{
    pub(crate) fn new(key: &'a str, sink: F) -> Self {
        Self { key, sink }
    }
}

impl<'de, F> DeserializeSeed<'de> for ArrayStream<'_, F>
where
    F: FnMut(Record) -> ControlFlow<()>,
{
    /// Whether the target key was present in the document.
    type Value = bool;

    fn deserialize<D>(self, deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de, F> Visitor<'de> for ArrayStream<'_, F>
where
    F: FnMut(Record) -> ControlFlow<()>,
{
    type Value = bool;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a JSON object containing the \"{}\" array", self.key)
    }

    fn visit_map<A>(mut self, mut map: A) -> Result<bool, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut found = false;
        while let Some(name) = map.next_key::<String>()? {
            if !found && name == self.key {
                map.next_value_seed(ElementSink {
                    sink: &mut self.sink,
                })?;
                found = true;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(found)
    }
}

/// Streams the elements of one JSON array into the sink, one record at a
/// time. A full handoff channel blocks here; that is the intended
/// backpressure.
struct ElementSink<'a, F> {
    sink: &'a mut F,
}

impl<'de, F> DeserializeSeed<'de> for ElementSink<'_, F>
where
    F: FnMut(Record) -> ControlFlow<()>,
{
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, F> Visitor<'de> for ElementSink<'_, F>
where
    F: FnMut(Record) -> ControlFlow<()>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an array of records")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(record) = seq.next_element::<Record>()? {
            if (self.sink)(record).is_break() {
                return Err(serde::de::Error::custom("record sink closed"));
            }
        }
        Ok(())
    }
}
