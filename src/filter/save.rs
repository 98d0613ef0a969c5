use super::{Denial, PropertyFilter, SaveOutcome};
use crate::error::{FilterError, FilterResult};
use crate::schema::field::{CollectionKind, FieldDescriptor, FieldType};
use crate::schema::value::{RecordRef, Value};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

/// Value a field held before the walk wrote to it. `None` means the field was absent.
type UndoEntry = (RecordRef, String, Option<Value>);

/// One save-merge pass. `merged` maps incoming record identity to its merge
/// target so a record reachable twice (or through a cycle) is merged once.
/// Every write to a record is journaled in `undo` so a failed pass can be
/// rolled back.
pub(super) struct SaveWalk<'a> {
    filter: &'a PropertyFilter,
    group: &'a str,
    opaque: HashSet<String>,
    merged: HashMap<usize, RecordRef>,
    undo: Vec<UndoEntry>,
}

impl<'a> SaveWalk<'a> {
    pub(super) fn new(filter: &'a PropertyFilter, group: &'a str, opaque: HashSet<String>) -> Self {
        Self {
            filter,
            group,
            opaque,
            merged: HashMap::new(),
            undo: Vec::new(),
        }
    }

    /// Restores every field the walk wrote, newest first.
    pub(super) fn rollback(&mut self) -> FilterResult<()> {
        while let Some((target, field, previous)) = self.undo.pop() {
            let mut record = target.write()?;
            match previous {
                Some(value) => record.set(field, value),
                None => {
                    record.remove(&field);
                }
            }
        }
        self.merged.clear();
        Ok(())
    }

    fn journal(&mut self, target: &RecordRef, field: &str, previous: Option<Value>) {
        self.undo.push((target.clone(), field.to_string(), previous));
    }

    pub(super) fn record(
        &mut self,
        incoming: &RecordRef,
        existing: Option<RecordRef>,
    ) -> FilterResult<SaveOutcome> {
        if let Some(target) = self.merged.get(&incoming.id()) {
            return Ok(SaveOutcome::Merged(target.clone()));
        }

        let type_key = incoming.type_key()?;
        if self.opaque.contains(&type_key) {
            return Ok(SaveOutcome::Merged(incoming.clone()));
        }

        let access = self.filter.store.get_access(&type_key, self.group)?;
        if !access.level.can_write() {
            return Ok(SaveOutcome::Denied(Denial {
                type_key,
                group: self.group.to_string(),
                level: access.level,
                existing,
            }));
        }

        let target = match existing {
            Some(existing) => {
                let existing_type = existing.type_key()?;
                if existing_type != type_key {
                    return Err(FilterError::InvalidArgument(format!(
                        "Cannot merge a {} into a stored {}",
                        type_key, existing_type
                    )));
                }
                existing
            }
            None => self.filter.accessor.new_instance(&type_key)?,
        };
        self.merged.insert(incoming.id(), target.clone());

        let writable: Vec<(FieldDescriptor, Value)> = {
            let record = incoming.read()?;
            let mut writable = Vec::new();
            for field in self.filter.accessor.fields(&type_key)? {
                if !self.filter.field_level(&access, &field.name)?.can_write() {
                    continue;
                }
                let value = self.filter.accessor.get(&record, &field.name);
                writable.push((field, value));
            }
            writable
        };

        for (field, value) in writable {
            self.merge_field(&target, &field, value)?;
        }
        Ok(SaveOutcome::Merged(target))
    }

    fn merge_field(
        &mut self,
        target: &RecordRef,
        field: &FieldDescriptor,
        incoming: Value,
    ) -> FilterResult<()> {
        let filter = self.filter;
        let config = &filter.config;
        match &field.field_type {
            FieldType::Single(type_key) if self.opaque.contains(type_key) => {
                self.assign(target, &field.name, incoming)
            }
            FieldType::Single(_) => match incoming {
                Value::Record(nested) if config.filter_relations_on_save => {
                    let stored = target.get(&field.name)?.as_record().cloned();
                    match self.record(&nested, stored)? {
                        SaveOutcome::Merged(merged) => {
                            self.assign(target, &field.name, Value::Record(merged))
                        }
                        SaveOutcome::Denied(denial) => {
                            debug!("Keeping stored {} on field {}: {}", denial.type_key, field.name, denial);
                            Ok(())
                        }
                    }
                }
                other => self.assign(target, &field.name, other),
            },
            FieldType::Collection { kind, .. } => match incoming {
                Value::List(items) | Value::Set(items) => {
                    let stored: Option<Vec<Value>> = target
                        .get(&field.name)?
                        .as_collection()
                        .map(|(_, items)| items.to_vec());
                    let result = self.reconcile(stored.as_deref(), &items, *kind)?;
                    self.replace_contents(target, &field.name, *kind, result)
                }
                other => self.assign(target, &field.name, other),
            },
        }
    }

    fn assign(&mut self, target: &RecordRef, field: &str, value: Value) -> FilterResult<()> {
        let previous = {
            let mut record = target.write()?;
            let previous = record.get(field).cloned();
            self.filter.accessor.set(&mut record, field, value);
            previous
        };
        self.journal(target, field, previous);
        Ok(())
    }

    /// Clears and refills the stored collection so holders of it see the
    /// new contents. A missing collection is created.
    fn replace_contents(
        &mut self,
        target: &RecordRef,
        field: &str,
        kind: CollectionKind,
        items: Vec<Value>,
    ) -> FilterResult<()> {
        let previous = {
            let mut record = target.write()?;
            let previous = record.get(field).cloned();
            if let Some(stored) = record.get_mut(field).and_then(Value::as_collection_mut) {
                stored.clear();
                stored.extend(items);
            } else {
                let mut fresh = self.filter.accessor.new_collection(kind);
                if let Some(contents) = fresh.as_collection_mut() {
                    contents.extend(items);
                }
                self.filter.accessor.set(&mut record, field, fresh);
            }
            previous
        };
        self.journal(target, field, previous);
        Ok(())
    }

    /// Rebuilds a collection from the incoming elements.
    ///
    /// Membership follows `incoming` exactly: stored elements without an
    /// incoming counterpart are dropped. Each incoming record is merged into
    /// its stored match (or a fresh instance). Opaque elements are kept as the
    /// stored value when one matches and taken as is otherwise.
    pub(super) fn reconcile(
        &mut self,
        stored: Option<&[Value]>,
        incoming: &[Value],
        kind: CollectionKind,
    ) -> FilterResult<Vec<Value>> {
        if !self.filter.config.filter_collections_on_save {
            return Ok(incoming.to_vec());
        }

        let mut result: Vec<Value> = Vec::with_capacity(incoming.len());
        for element in incoming {
            let matched = match stored {
                Some(stored) => self.find_match(stored, element)?,
                None => None,
            };

            let value = match element {
                Value::Record(record) if !self.is_opaque_record(record)? => {
                    let stored_record = matched.as_ref().and_then(Value::as_record).cloned();
                    match self.record(record, stored_record)? {
                        SaveOutcome::Merged(merged) => Value::Record(merged),
                        SaveOutcome::Denied(denial) => match denial.existing {
                            Some(kept) => Value::Record(kept),
                            None => {
                                warn!(
                                    "Dropping new {} element, group {} has {} access",
                                    denial.type_key, denial.group, denial.level
                                );
                                continue;
                            }
                        },
                    }
                }
                _ => matched.unwrap_or_else(|| element.clone()),
            };

            if kind == CollectionKind::Set && self.find_match(&result, &value)?.is_some() {
                continue;
            }
            result.push(value);
        }
        Ok(result)
    }

    fn is_opaque_record(&self, record: &RecordRef) -> FilterResult<bool> {
        Ok(self.opaque.contains(&record.type_key()?))
    }

    fn find_match(&self, candidates: &[Value], element: &Value) -> FilterResult<Option<Value>> {
        for candidate in candidates {
            if self.values_match(candidate, element)? {
                return Ok(Some(candidate.clone()));
            }
        }
        Ok(None)
    }

    fn values_match(&self, a: &Value, b: &Value) -> FilterResult<bool> {
        match (a, b) {
            (Value::Record(a), Value::Record(b)) => {
                if a.ptr_eq(b) {
                    return Ok(true);
                }
                let left = a.read()?;
                let right = b.read()?;
                Ok(left.type_key() == right.type_key()
                    && self.filter.accessor.same_identity(&left, &right))
            }
            _ => Ok(a == b),
        }
    }
}
