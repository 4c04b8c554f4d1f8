pub mod crypto;
pub mod structural;
pub mod visual;

pub use crypto::CryptoStage;
pub use structural::StructuralStage;
pub use visual::VisualStage;
