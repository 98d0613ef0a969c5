//! Common test utilities and fixtures for the filter integration tests
//!
//! Provides a small billing catalog, a set of groups over it and helpers for
//! building records.

#![allow(dead_code)]

use property_filter::{
    Access, AccessLevel, FieldType, Group, Permission, PermissionLevel, PropertyFilter, Record,
    RecordRef, TypeDescriptor, TypeRegistry, Value,
};
use property_filter::schema::registry::field;
use std::sync::Arc;

pub const INVOICE: &str = "billing.Invoice";
pub const LINE: &str = "billing.Line";
pub const CUSTOMER: &str = "billing.Customer";
pub const MONEY: &str = "billing.Money";

/// Initialise test logging once per binary
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Billing types: invoices with lines, a customer and an ignored money type.
pub fn billing_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register(
            TypeDescriptor::new(INVOICE, "billing")
                .display_name("Invoice")
                .identity(["id"])
                .field(field("id", FieldType::single("string")).marked(PermissionLevel::Read))
                .field(field("total", FieldType::single("integer")))
                .field(field("note", FieldType::single("string")))
                .field(field("customer", FieldType::single(CUSTOMER)))
                .field(field("lines", FieldType::list_of(LINE)))
                .field(field("tags", FieldType::set_of("string")))
                .field(field("amount", FieldType::single(MONEY))),
        )
        .register(
            TypeDescriptor::new(LINE, "billing")
                .display_name("Line")
                .identity(["sku"])
                .field(field("sku", FieldType::single("string")))
                .field(field("qty", FieldType::single("integer")))
                .field(field("invoice", FieldType::single(INVOICE))),
        )
        .register(
            TypeDescriptor::new(CUSTOMER, "billing.crm")
                .display_name("Customer")
                .identity(["name"])
                .field(field("name", FieldType::single("string")))
                .field(field("email", FieldType::single("string"))),
        )
        .register(
            TypeDescriptor::new(MONEY, "billing")
                .ignored()
                .field(field("cents", FieldType::single("long"))),
        );
    registry
}

fn invoice_access(level: AccessLevel, total: PermissionLevel, note: PermissionLevel) -> Access {
    Access::new(INVOICE, level, false)
        .with_display_name("Invoice")
        .with_permission(Permission::new("id", PermissionLevel::Read, true))
        .with_permission(Permission::new("total", total, false))
        .with_permission(Permission::new("note", note, false))
        .with_permission(Permission::new("customer", PermissionLevel::Write, false))
        .with_permission(Permission::new("lines", PermissionLevel::Write, false))
        .with_permission(Permission::new("tags", PermissionLevel::Write, false))
        .with_permission(Permission::new("amount", PermissionLevel::Write, false))
}

fn line_access(level: AccessLevel) -> Access {
    Access::new(LINE, level, false)
        .with_display_name("Line")
        .with_permission(Permission::new("sku", PermissionLevel::Write, false))
        .with_permission(Permission::new("qty", PermissionLevel::Write, false))
        .with_permission(Permission::new("invoice", PermissionLevel::Write, false))
}

fn customer_access(level: AccessLevel) -> Access {
    Access::new(CUSTOMER, level, false)
        .with_display_name("Customer")
        .with_permission(Permission::new("name", PermissionLevel::Write, false))
        .with_permission(Permission::new("email", PermissionLevel::Read, false))
}

/// Clerks (alice) edit invoices and lines but never see customers or notes.
/// Auditors (bob) read everything. Guests (carol) see nothing.
pub fn billing_groups() -> Vec<Group> {
    vec![
        Group::new("Clerks")
            .with_member("alice")
            .with_access(invoice_access(
                AccessLevel::Update,
                PermissionLevel::Write,
                PermissionLevel::NoAccess,
            ))
            .with_access(line_access(AccessLevel::Update))
            .with_access(customer_access(AccessLevel::NoAccess)),
        Group::new("Auditors")
            .with_member("bob")
            .with_access(invoice_access(
                AccessLevel::Read,
                PermissionLevel::Read,
                PermissionLevel::Read,
            ))
            .with_access(line_access(AccessLevel::Read))
            .with_access(customer_access(AccessLevel::Read)),
        Group::new("Guests")
            .with_member("carol")
            .with_access(invoice_access(
                AccessLevel::NoAccess,
                PermissionLevel::NoAccess,
                PermissionLevel::NoAccess,
            )),
    ]
}

/// A filter over the billing registry with the billing groups published.
pub fn billing_filter() -> PropertyFilter {
    init_logging();
    let filter = PropertyFilter::builder()
        .accessor(Arc::new(billing_registry()))
        .add_opaque_type(MONEY)
        .build()
        .expect("filter builds");
    filter
        .replace_policy(&billing_groups())
        .expect("policy replaced");
    filter
}

pub fn line(sku: &str, qty: i64) -> RecordRef {
    Record::new(LINE).with("sku", sku).with("qty", qty).into_ref()
}

pub fn customer(name: &str, email: &str) -> RecordRef {
    Record::new(CUSTOMER)
        .with("name", name)
        .with("email", email)
        .into_ref()
}

/// A fully populated invoice with two lines pointing back at it.
pub fn sample_invoice() -> RecordRef {
    let invoice = Record::new(INVOICE)
        .with("id", "INV-1")
        .with("total", 100)
        .with("note", "pay late")
        .with("customer", customer("ACME", "billing@acme.test"))
        .with("tags", Value::Set(vec!["urgent".into(), "q3".into()]))
        .with(
            "amount",
            Record::new(MONEY).with("cents", 10_000i64),
        )
        .into_ref();
    let lines = vec![line("a", 1), line("b", 2)];
    for l in &lines {
        l.set("invoice", invoice.clone()).unwrap();
    }
    invoice
        .set("lines", Value::List(lines.into_iter().map(Value::Record).collect()))
        .unwrap();
    invoice
}

/// Records held by a collection field, in order.
pub fn records_in(record: &RecordRef, field: &str) -> Vec<RecordRef> {
    match record.get(field).unwrap() {
        Value::List(items) | Value::Set(items) => items
            .into_iter()
            .filter_map(|v| v.as_record().cloned())
            .collect(),
        other => panic!("{} is not a collection: {:?}", field, other),
    }
}
