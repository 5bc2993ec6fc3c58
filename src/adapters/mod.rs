pub mod abi;
pub mod explorer;
pub mod horizon;
pub mod traits;
pub mod writer;

pub use explorer::ExplorerClient;
pub use horizon::HorizonClient;
pub use writer::SigningWriter;
