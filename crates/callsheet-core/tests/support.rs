//! Shared setup for the integration suites.
#![allow(dead_code)]

use callsheet_core::engine::{NewUser, PasswordPolicy, allocate, register};
use callsheet_core::model::{Payload, User, WorkItem};
use callsheet_core::store::Ledger;

pub fn join<L: Ledger>(ledger: &L, name: &str) -> String {
    let email = format!("{name}@example.org");
    register(
        ledger,
        NewUser {
            display_name: name.to_uppercase(),
            username: name.to_string(),
            email: email.clone(),
            password: "pw".to_string(),
        },
        &PasswordPolicy::with_rounds(1),
    )
    .expect("register");
    email
}

pub fn give<L: Ledger>(ledger: &L, email: &str, count: usize) -> Vec<WorkItem> {
    let tag = email.split('@').next().unwrap_or(email);
    let rows = (1..=count)
        .map(|i| Payload::named(format!("{tag}-{i}")))
        .collect();
    allocate(ledger, email, rows).expect("allocate")
}

pub fn rows<L: Ledger>(ledger: &L, email: &str) -> Vec<WorkItem> {
    ledger
        .view(|tx| tx.list_by_owner(email))
        .expect("list rows")
}

pub fn serials<L: Ledger>(ledger: &L, email: &str) -> Vec<u32> {
    rows(ledger, email).iter().map(|item| item.serial_no).collect()
}

pub fn user<L: Ledger>(ledger: &L, email: &str) -> User {
    ledger
        .view(|tx| tx.get(email))
        .expect("get user")
        .expect("user exists")
}
