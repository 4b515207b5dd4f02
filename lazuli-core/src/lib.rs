pub mod id;
pub mod load;
pub mod outline;
pub mod scene;
pub mod session;
pub mod store;
pub mod viewport;

use id::LazID;
