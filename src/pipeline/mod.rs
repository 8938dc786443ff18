pub mod extraction;
pub mod structuring;
pub mod reconcile;
pub mod processor; // Boundary: image/audio prescription → both stores
