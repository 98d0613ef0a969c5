mod common;

use common::*;
use property_filter::{
    AccessLevel, FilterConfig, FilterError, PermissionLevel, PropertyFilter, Record, RecordRef, Subject, Value,
};
use std::sync::Arc;

#[test]
fn clerks_see_only_readable_fields() {
    let filter = billing_filter();
    let source = sample_invoice();

    let copy = filter
        .filter_for_read(&source, Subject::User("alice"))
        .unwrap()
        .expect("clerks may read invoices");

    assert!(!copy.ptr_eq(&source));
    assert_eq!(copy.get("id").unwrap(), Value::from("INV-1"));
    assert_eq!(copy.get("total").unwrap(), Value::Integer(100));
    assert!(copy.get("note").unwrap().is_null());
    // Customer is NoAccess for clerks, so the relation reads as empty
    assert!(copy.get("customer").unwrap().is_null());

    // The source is never touched
    assert_eq!(source.get("note").unwrap(), Value::from("pay late"));
    assert!(source.get("customer").unwrap().as_record().is_some());
}

#[test]
fn no_access_types_come_back_absent() {
    let filter = billing_filter();
    let source = sample_invoice();
    assert!(filter
        .filter_for_read(&source, Subject::User("carol"))
        .unwrap()
        .is_none());
    assert!(filter
        .filter_for_read(&customer("ACME", "a@b.test"), Subject::Group("Clerks"))
        .unwrap()
        .is_none());
}

#[test]
fn unknown_users_and_groups_are_errors() {
    let filter = billing_filter();
    let source = sample_invoice();
    assert!(matches!(
        filter.filter_for_read(&source, Subject::User("mallory")),
        Err(FilterError::NoGroupAssigned { .. })
    ));
    assert!(matches!(
        filter.filter_for_read(&source, Subject::Group("Nobody")),
        Err(FilterError::GroupNotFound { .. })
    ));
}

#[test]
fn usernames_resolve_case_insensitively() {
    let filter = billing_filter();
    let copy = filter
        .filter_for_read(&sample_invoice(), Subject::User("ALICE"))
        .unwrap();
    assert!(copy.is_some());
}

#[test]
fn collections_are_filtered_element_by_element() {
    let filter = billing_filter();
    let source = sample_invoice();
    let copy = filter
        .filter_for_read(&source, Subject::User("alice"))
        .unwrap()
        .unwrap();

    let source_lines = records_in(&source, "lines");
    let lines = records_in(&copy, "lines");
    assert_eq!(lines.len(), 2);
    for (copied, original) in lines.iter().zip(&source_lines) {
        assert!(!copied.ptr_eq(original));
        assert_eq!(copied.get("sku").unwrap(), original.get("sku").unwrap());
    }

    // Plain sets of leaves are copied as they are
    assert_eq!(
        copy.get("tags").unwrap(),
        Value::Set(vec!["urgent".into(), "q3".into()])
    );
}

#[test]
fn cycles_point_back_at_the_copy() {
    let filter = billing_filter();
    let source = sample_invoice();
    let copy = filter
        .filter_for_read(&source, Subject::User("alice"))
        .unwrap()
        .unwrap();

    for line in records_in(&copy, "lines") {
        let back = line.get("invoice").unwrap();
        assert!(back.as_record().unwrap().ptr_eq(&copy));
    }
}

#[test]
fn shared_records_stay_shared() {
    let filter = billing_filter();
    let shared = line("a", 1);
    let invoice = Record::new(INVOICE)
        .with("id", "INV-2")
        .with(
            "lines",
            Value::List(vec![Value::Record(shared.clone()), Value::Record(shared)]),
        )
        .into_ref();

    let copy = filter
        .filter_for_read(&invoice, Subject::User("alice"))
        .unwrap()
        .unwrap();
    let lines = records_in(&copy, "lines");
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ptr_eq(&lines[1]));
}

#[test]
fn opaque_values_are_copied_by_reference() {
    let filter = billing_filter();
    let source = sample_invoice();
    let copy = filter
        .filter_for_read(&source, Subject::User("alice"))
        .unwrap()
        .unwrap();
    let original = source.get("amount").unwrap();
    assert_eq!(copy.get("amount").unwrap(), original);
}

#[test]
fn filtering_twice_changes_nothing() {
    let filter = billing_filter();
    let once = filter
        .filter_for_read(&sample_invoice(), Subject::User("alice"))
        .unwrap()
        .unwrap();
    let twice = filter
        .filter_for_read(&once, Subject::User("alice"))
        .unwrap()
        .unwrap();

    for field in ["id", "total", "note", "customer", "tags", "amount"] {
        assert_eq!(twice.get(field).unwrap(), once.get(field).unwrap(), "{}", field);
    }
    let skus = |record: &RecordRef| {
        records_in(record, "lines")
            .iter()
            .map(|l| l.get("sku").unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(skus(&twice), skus(&once));
}

#[test]
fn collection_filtering_can_be_switched_off() {
    let filter = PropertyFilter::builder()
        .accessor(Arc::new(billing_registry()))
        .add_opaque_type(MONEY)
        .filter_collections_on_load(false)
        .build()
        .unwrap();
    filter.replace_policy(&billing_groups()).unwrap();

    let source = sample_invoice();
    let copy = filter
        .filter_for_read(&source, Subject::User("alice"))
        .unwrap()
        .unwrap();
    let originals = records_in(&source, "lines");
    let lines = records_in(&copy, "lines");
    assert!(lines.iter().zip(&originals).all(|(a, b)| a.ptr_eq(b)));
}

#[test]
fn relation_filtering_can_be_switched_off() {
    let filter = PropertyFilter::builder()
        .accessor(Arc::new(billing_registry()))
        .add_opaque_type(MONEY)
        .filter_relations_on_load(false)
        .build()
        .unwrap();
    filter.replace_policy(&billing_groups()).unwrap();

    let source = sample_invoice();
    let copy = filter
        .filter_for_read(&source, Subject::User("alice"))
        .unwrap()
        .unwrap();
    assert_eq!(copy.get("customer").unwrap(), source.get("customer").unwrap());
}

#[test]
fn missing_permissions_follow_the_strictness_switch() {
    let mut groups = billing_groups();
    groups[0]
        .access_for_mut(INVOICE)
        .unwrap()
        .permissions
        .retain(|p| p.property_name != "tags");

    let strict = billing_filter();
    strict.replace_policy(&groups).unwrap();
    assert!(matches!(
        strict.filter_for_read(&sample_invoice(), Subject::User("alice")),
        Err(FilterError::PermissionNotDefined { .. })
    ));

    let lenient = PropertyFilter::builder()
        .accessor(Arc::new(billing_registry()))
        .add_opaque_type(MONEY)
        .config(FilterConfig::lenient())
        .build()
        .unwrap();
    lenient.replace_policy(&groups).unwrap();
    let copy = lenient
        .filter_for_read(&sample_invoice(), Subject::User("alice"))
        .unwrap()
        .unwrap();
    assert!(!copy.get("tags").unwrap().is_null());
}

#[test]
fn policy_queries_accept_display_names() {
    let filter = billing_filter();
    assert!(filter.has_read_access("Invoice", Subject::User("alice")));
    assert!(filter.has_write_access("Invoice", Subject::User("alice")));
    assert!(!filter.has_write_access("Invoice", Subject::User("bob")));
    assert!(!filter.has_read_access("Customer", Subject::User("alice")));
    assert!(!filter.has_read_access("Invoice", Subject::User("mallory")));

    let access = filter.get_access("Invoice", Subject::Group("Auditors")).unwrap();
    assert_eq!(access.level, AccessLevel::Read);

    let fields = filter
        .accessible_fields("billing.Invoice", Subject::User("alice"))
        .unwrap();
    assert!(fields.iter().all(|p| p.level != PermissionLevel::NoAccess));
    assert!(!fields.iter().any(|p| p.property_name == "note"));
    assert!(fields.iter().any(|p| p.property_name == "total"));

    assert_eq!(
        filter.accessible_types(Subject::User("alice")).unwrap(),
        vec![INVOICE.to_string(), LINE.to_string()]
    );
}
