//! Account and address lookups owned by other parts of the platform.
//!
//! The engine only asks two questions of them: does an account exist and what
//! role does it carry, and where is an address.

use dashmap::DashMap;
use uuid::Uuid;

use crate::models::account::{Account, Address, Role};

pub trait AccountDirectory: Send + Sync {
    fn account(&self, id: Uuid) -> Option<Account>;
}

pub trait AddressDirectory: Send + Sync {
    fn address(&self, id: Uuid) -> Option<Address>;
}

#[derive(Default)]
pub struct MemoryDirectory {
    accounts: DashMap<Uuid, Account>,
    addresses: DashMap<Uuid, Address>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_account(&self, account: Account) {
        self.accounts.insert(account.id, account);
    }

    pub fn insert_address(&self, address: Address) {
        self.addresses.insert(address.id, address);
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn riders(&self) -> usize {
        self.accounts
            .iter()
            .filter(|entry| entry.value().role == Role::Rider)
            .count()
    }
}

impl AccountDirectory for MemoryDirectory {
    fn account(&self, id: Uuid) -> Option<Account> {
        self.accounts.get(&id).map(|entry| entry.value().clone())
    }
}

impl AddressDirectory for MemoryDirectory {
    fn address(&self, id: Uuid) -> Option<Address> {
        self.addresses.get(&id).map(|entry| entry.value().clone())
    }
}
