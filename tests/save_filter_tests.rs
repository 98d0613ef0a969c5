mod common;

use common::*;
use property_filter::{
    AccessLevel, FilterError, PropertyFilter, Record, RecordRef, SaveOutcome, Subject, Value,
};
use std::sync::Arc;

fn merged(outcome: SaveOutcome) -> RecordRef {
    outcome.into_result().expect("save allowed")
}

fn invoice_with_lines(id: &str, lines: Vec<RecordRef>) -> RecordRef {
    Record::new(INVOICE)
        .with("id", id)
        .with(
            "lines",
            Value::List(lines.into_iter().map(Value::Record).collect()),
        )
        .into_ref()
}

#[test]
fn only_writable_fields_are_merged() {
    let filter = billing_filter();
    let existing = Record::new(INVOICE)
        .with("id", "Y")
        .with("total", 100)
        .with("note", "keep me")
        .into_ref();
    let incoming = Record::new(INVOICE)
        .with("id", "X")
        .with("total", 500)
        .with("note", "overwritten?")
        .into_ref();

    let result = merged(
        filter
            .filter_for_save(&incoming, Some(&existing), Subject::User("alice"))
            .unwrap(),
    );

    assert!(result.ptr_eq(&existing));
    assert_eq!(result.get("total").unwrap(), Value::Integer(500));
    assert_eq!(result.get("id").unwrap(), Value::from("Y"));
    assert_eq!(result.get("note").unwrap(), Value::from("keep me"));
}

#[test]
fn new_records_start_from_a_fresh_instance() {
    let filter = billing_filter();
    let incoming = Record::new(INVOICE)
        .with("id", "X")
        .with("total", 500)
        .into_ref();

    let result = merged(
        filter
            .filter_for_save(&incoming, None, Subject::User("alice"))
            .unwrap(),
    );
    assert!(!result.ptr_eq(&incoming));
    assert_eq!(result.get("total").unwrap(), Value::Integer(500));
    assert!(result.get("id").unwrap().is_null());
}

#[test]
fn collections_follow_incoming_membership() {
    let filter = billing_filter();
    let stored_a = line("a", 1);
    let stored_b = line("b", 2);
    let existing = invoice_with_lines("INV-1", vec![stored_a.clone(), stored_b]);
    let incoming = invoice_with_lines("INV-1", vec![line("a", 9), line("c", 3)]);

    let result = merged(
        filter
            .filter_for_save(&incoming, Some(&existing), Subject::User("alice"))
            .unwrap(),
    );

    let lines = records_in(&result, "lines");
    assert_eq!(lines.len(), 2);
    // a is updated in place, b is dropped, c is added as a new record
    assert!(lines[0].ptr_eq(&stored_a));
    assert_eq!(stored_a.get("qty").unwrap(), Value::Integer(9));
    assert_eq!(lines[1].get("sku").unwrap(), Value::from("c"));
    assert_eq!(lines[1].get("qty").unwrap(), Value::Integer(3));
    assert!(!lines[1].ptr_eq(&records_in(&incoming, "lines")[1]));
}

#[test]
fn read_only_groups_are_denied() {
    let filter = billing_filter();
    let existing = Record::new(INVOICE).with("total", 100).into_ref();
    let incoming = Record::new(INVOICE).with("total", 500).into_ref();

    let outcome = filter
        .filter_for_save(&incoming, Some(&existing), Subject::User("bob"))
        .unwrap();
    assert!(outcome.is_denied());
    assert_eq!(existing.get("total").unwrap(), Value::Integer(100));

    let denial = outcome.clone().into_result().unwrap_err();
    assert_eq!(denial.level, AccessLevel::Read);
    assert_eq!(denial.group, "Auditors");
    assert!(outcome.into_merged_or_existing().unwrap().ptr_eq(&existing));

    let none = filter
        .filter_for_save(&incoming, None, Subject::User("carol"))
        .unwrap();
    assert!(none.into_merged_or_existing().is_none());
}

#[test]
fn denied_relations_keep_the_stored_value() {
    let filter = billing_filter();
    let stored_customer = customer("ACME", "billing@acme.test");
    let existing = Record::new(INVOICE)
        .with("customer", stored_customer.clone())
        .into_ref();
    let incoming = Record::new(INVOICE)
        .with("total", 1)
        .with("customer", customer("Evil Corp", "x@evil.test"))
        .into_ref();

    let result = merged(
        filter
            .filter_for_save(&incoming, Some(&existing), Subject::User("alice"))
            .unwrap(),
    );
    let kept = result.get("customer").unwrap();
    assert!(kept.as_record().unwrap().ptr_eq(&stored_customer));
    assert_eq!(stored_customer.get("name").unwrap(), Value::from("ACME"));
}

#[test]
fn denied_elements_keep_their_stored_match_or_are_dropped() {
    let mut groups = billing_groups();
    groups[0].access_for_mut(LINE).unwrap().level = AccessLevel::Read;
    let filter = billing_filter();
    filter.replace_policy(&groups).unwrap();

    let stored_a = line("a", 1);
    let existing = invoice_with_lines("INV-1", vec![stored_a.clone(), line("b", 2)]);
    let incoming = invoice_with_lines("INV-1", vec![line("a", 9), line("z", 1)]);

    let result = merged(
        filter
            .filter_for_save(&incoming, Some(&existing), Subject::User("alice"))
            .unwrap(),
    );
    let lines = records_in(&result, "lines");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ptr_eq(&stored_a));
    assert_eq!(stored_a.get("qty").unwrap(), Value::Integer(1));
}

#[test]
fn sets_hold_each_element_once() {
    let filter = billing_filter();
    let existing = Record::new(INVOICE)
        .with("tags", Value::Set(vec!["old".into()]))
        .into_ref();
    let incoming = Record::new(INVOICE)
        .with(
            "tags",
            Value::Set(vec!["x".into(), "y".into(), "x".into()]),
        )
        .into_ref();

    let result = merged(
        filter
            .filter_for_save(&incoming, Some(&existing), Subject::User("alice"))
            .unwrap(),
    );
    assert_eq!(
        result.get("tags").unwrap(),
        Value::Set(vec!["x".into(), "y".into()])
    );
}

#[test]
fn cyclic_incoming_records_are_merged_once() {
    let filter = billing_filter();
    let incoming = sample_invoice();

    let result = merged(
        filter
            .filter_for_save(&incoming, None, Subject::User("alice"))
            .unwrap(),
    );
    for line in records_in(&result, "lines") {
        let back = line.get("invoice").unwrap();
        assert!(back.as_record().unwrap().ptr_eq(&result));
    }
}

#[test]
fn read_then_save_keeps_only_read_write_fields() {
    let filter = billing_filter();
    let source = sample_invoice();
    let visible = filter
        .filter_for_read(&source, Subject::User("alice"))
        .unwrap()
        .unwrap();

    let result = merged(
        filter
            .filter_for_save(&visible, None, Subject::User("alice"))
            .unwrap(),
    );

    // id is read-only and note is hidden: neither survives the merge
    assert!(result.get("id").unwrap().is_null());
    assert!(result.get("note").unwrap().is_null());
    assert_eq!(result.get("total").unwrap(), Value::Integer(100));
    assert_eq!(result.get("tags").unwrap(), source.get("tags").unwrap());
    assert_eq!(result.get("amount").unwrap(), source.get("amount").unwrap());
    let skus: Vec<Value> = records_in(&result, "lines")
        .iter()
        .map(|l| l.get("sku").unwrap())
        .collect();
    assert_eq!(skus, vec![Value::from("a"), Value::from("b")]);
}

#[test]
fn collection_merging_can_be_switched_off() {
    let filter = PropertyFilter::builder()
        .accessor(Arc::new(billing_registry()))
        .add_opaque_type(MONEY)
        .filter_collections_on_save(false)
        .build()
        .unwrap();
    filter.replace_policy(&billing_groups()).unwrap();

    let existing = invoice_with_lines("INV-1", vec![line("a", 1)]);
    let incoming_line = line("a", 9);
    let incoming = invoice_with_lines("INV-1", vec![incoming_line.clone()]);

    let result = merged(
        filter
            .filter_for_save(&incoming, Some(&existing), Subject::User("alice"))
            .unwrap(),
    );
    let lines = records_in(&result, "lines");
    assert!(lines[0].ptr_eq(&incoming_line));
}

#[test]
fn mismatched_types_are_rejected() {
    let filter = billing_filter();
    let existing = Record::new(INVOICE).into_ref();
    assert!(matches!(
        filter.filter_for_save(&line("a", 1), Some(&existing), Subject::User("alice")),
        Err(FilterError::InvalidArgument(_))
    ));
}

#[test]
fn opaque_records_pass_through() {
    let filter = billing_filter();
    let money = Record::new(MONEY).with("cents", 5i64).into_ref();
    let result = merged(
        filter
            .filter_for_save(&money, None, Subject::User("bob"))
            .unwrap(),
    );
    assert!(result.ptr_eq(&money));
}

#[test]
fn failed_saves_leave_stored_records_untouched() {
    init_logging();
    let filter = billing_filter();
    let stored_a = line("a", 1);
    let existing = invoice_with_lines("INV-1", vec![stored_a.clone()]);
    existing.set("total", 100).unwrap();

    // The first line merges onto its stored match before the unknown type fails the walk
    let ghost = Record::new("billing.Ghost").with("sku", "g").into_ref();
    let incoming = invoice_with_lines("INV-1", vec![line("a", 9), ghost]);
    incoming.set("total", 500).unwrap();

    let err = filter
        .filter_for_save(&incoming, Some(&existing), Subject::User("alice"))
        .unwrap_err();
    assert!(matches!(err, FilterError::AccessNotDefined { .. }));

    assert_eq!(existing.get("total").unwrap(), Value::Integer(100));
    let lines = records_in(&existing, "lines");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ptr_eq(&stored_a));
    assert_eq!(stored_a.get("qty").unwrap(), Value::Integer(1));
}
