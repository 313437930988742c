//! IR optimizations
//!
//! Three passes, always run in this order:
//!
//! 1. [`StringConcat`] turns chains of string `+` into one n-ary `Concat`
//! 2. [`ConstantFolder`] evaluates side-effect-free constant subtrees
//! 3. [`StaticExtractor`] hoists regex literals into static slots that the
//!    static initializer fills once at load
//!
//! Every pass is total over the IR and never changes observable behavior.

pub mod constant_fold;
pub mod static_extract;
pub mod string_concat;

pub use constant_fold::ConstantFolder;
pub use static_extract::StaticExtractor;
pub use string_concat::StringConcat;

use crate::compiler::ir::IrClass;
use crate::whitelist::Whitelist;

/// Run every pass over `class`.
pub fn optimize(class: &mut IrClass, whitelist: &Whitelist) {
    let joined = StringConcat::new(whitelist).run(class);
    let folded = ConstantFolder::new().fold(class);
    let hoisted = StaticExtractor::new().extract(class);
    tracing::debug!(joined, folded, hoisted, "optimized {}", class.name);
}
