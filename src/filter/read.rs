use super::PropertyFilter;
use crate::error::FilterResult;
use crate::schema::field::{CollectionKind, FieldDescriptor, FieldType};
use crate::schema::value::{RecordRef, Value};
use log::debug;
use std::collections::{HashMap, HashSet};

/// One read-filter pass. `copies` maps source record identity to its filtered
/// copy so a record reachable twice (or through a cycle) is copied once.
pub(super) struct ReadWalk<'a> {
    filter: &'a PropertyFilter,
    group: &'a str,
    opaque: HashSet<String>,
    copies: HashMap<usize, RecordRef>,
}

impl<'a> ReadWalk<'a> {
    pub(super) fn new(filter: &'a PropertyFilter, group: &'a str, opaque: HashSet<String>) -> Self {
        Self {
            filter,
            group,
            opaque,
            copies: HashMap::new(),
        }
    }

    pub(super) fn record(&mut self, source: &RecordRef) -> FilterResult<Option<RecordRef>> {
        if let Some(copy) = self.copies.get(&source.id()) {
            return Ok(Some(copy.clone()));
        }

        let type_key = source.type_key()?;
        if self.opaque.contains(&type_key) {
            return Ok(Some(source.clone()));
        }

        let access = self.filter.store.get_access(&type_key, self.group)?;
        if !access.level.can_read() {
            debug!("Group {} has no access to {}, hiding record", self.group, type_key);
            return Ok(None);
        }

        let target = self.filter.accessor.new_instance(&type_key)?;
        self.copies.insert(source.id(), target.clone());

        // Values are cloned out first so no lock is held while recursing.
        let readable: Vec<(FieldDescriptor, Value)> = {
            let record = source.read()?;
            let mut readable = Vec::new();
            for field in self.filter.accessor.fields(&type_key)? {
                if !self.filter.field_level(&access, &field.name)?.can_read() {
                    continue;
                }
                let value = self.filter.accessor.get(&record, &field.name);
                readable.push((field, value));
            }
            readable
        };

        for (field, value) in readable {
            let filtered = self.field_value(&field, value)?;
            let mut copy = target.write()?;
            self.filter.accessor.set(&mut copy, &field.name, filtered);
        }
        Ok(Some(target))
    }

    fn field_value(&mut self, field: &FieldDescriptor, value: Value) -> FilterResult<Value> {
        let filter = self.filter;
        let config = &filter.config;
        match &field.field_type {
            FieldType::Single(type_key) if self.opaque.contains(type_key) => Ok(value),
            FieldType::Single(_) => match value {
                Value::Record(nested) if config.filter_relations_on_load => {
                    Ok(self.record(&nested)?.map_or(Value::Null, Value::Record))
                }
                other => Ok(other),
            },
            FieldType::Collection { .. } if !config.filter_collections_on_load => Ok(value),
            FieldType::Collection { .. } => match value {
                Value::List(items) => self.collection(CollectionKind::List, items),
                Value::Set(items) => self.collection(CollectionKind::Set, items),
                other => Ok(other),
            },
        }
    }

    fn collection(&mut self, kind: CollectionKind, items: Vec<Value>) -> FilterResult<Value> {
        let mut filtered = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Record(element) => match self.record(&element)? {
                    Some(copy) => filtered.push(Value::Record(copy)),
                    None => debug!("Dropping hidden element from {:?} collection", kind),
                },
                other => filtered.push(other),
            }
        }
        Ok(Value::collection(kind, filtered))
    }
}
