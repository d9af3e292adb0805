/**
 * Fixed-order binary framing for payloads,
 *  results and cookies.
 */
pub mod codec;
/**
 * Cryptographic types and operations.
 *  - Key epochs with compressed AEAD encryption
 *  - Fixed-nonce scrambling of identifiers
 */
pub mod crypto;
pub mod form;
/**
 * Networks of nodes and client-affinity
 *  routing to a home node.
 */
pub mod network;
/**
 * Participants in a network: key rotation,
 *  scrambling and storage cookies.
 */
pub mod node;
/**
 * The bounce protocol: building, sealing and
 *  advancing in-flight storage operations.
 */
pub mod operation;
/**
 * Key/value pairs, their conflict policies
 *  and the merge applied at storage hops.
 */
pub mod pair;
pub mod results;
/**
 * Directory of nodes and networks.
 */
pub mod store;

pub mod prelude {
    pub use crate::crypto::{Secret, SecretError};
    pub use crate::form::FormValues;
    pub use crate::network::{Network, NetworkError};
    pub use crate::node::{Node, NodeError, Role};
    pub use crate::operation::{
        create_url, CreateRequest, Defaults, Hop, Html, Operation, OperationError, Route,
    };
    pub use crate::pair::{merge_pairs, Conflict, Pair, PairError};
    pub use crate::results::{Results, ResultsError};
    pub use crate::store::{MemoryNodeStore, NodeStore, StoreError};
}
