use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(pub i64);

impl Display for StoreId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vendor API credentials for one store. The private key is a PEM-encoded
/// PKCS#8 EC key and is never printed.
#[derive(Clone, Eq, PartialEq)]
pub struct StoreCredentials {
    pub issuer_id: String,
    pub key_id: String,
    pub private_key: String,
}

impl Debug for StoreCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("issuer_id", &self.issuer_id)
            .field("key_id", &self.key_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub credentials: StoreCredentials,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewStore {
    pub name: String,
    pub credentials: StoreCredentials,
}
