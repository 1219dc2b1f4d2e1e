use hashbrown::HashMap;

use crate::types::OperationId;

/// Parent operation id to direct child ids, in backend order.
pub type ChildIndex = HashMap<OperationId, Vec<OperationId>>;
