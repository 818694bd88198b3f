pub mod model;
pub mod password;
pub mod storage;
pub mod store;
pub mod token;
pub mod util;
