//! The canvas engine: graph store, undo history, geometry, hit testing, force layout
//! and the interaction state machine, bound together by [`Canvas`].

pub mod canvas;
pub mod geometry;
pub mod history;
pub mod hit_tester;
pub mod interaction;
pub mod layout;
pub mod store;

pub use canvas::{Canvas, CanvasOptions, DEFAULT_GROUP_NAME, DUPLICATE_OFFSET};
pub use geometry::CubicBezier;
pub use history::History;
pub use hit_tester::{HitResult, HitTester};
pub use interaction::{
    InteractionController, InteractionState, KeyCommand, Modifiers, PointerButton, PointerEvent,
    PointerKind, Response,
};
pub use layout::{CancellationToken, ForceLayouter, LayoutInput, LayoutOutcome, Layouter};
pub use store::{CanvasGraph, GroupPatch};
