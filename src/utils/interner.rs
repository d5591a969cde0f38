//! Global String Interner
//!
//! Maps option names and values to compact integer [`Symbol`]s so option sets
//! compare and hash as integers. Backs [`RenderOptions`](crate::resources::RenderOptions).

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact interned string identifier.
pub type Symbol = Spur;

/// Interns `s`, returning the existing symbol when already present.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up `s` without interning it.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a symbol back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    // The interner lives for the whole program, so resolved strings do too.
    let interner: &'static ThreadedRodeo = &INTERNER;
    interner.resolve(&sym)
}

/// Interns the option names every material and geometry emits so the first
/// frame does not pay for them.
pub fn preload_option_names() {
    let common = [
        // Material
        "HAS_MAP",
        "HAS_NORMAL_MAP",
        "HAS_EMISSIVE_MAP",
        "HAS_SPECULAR_MAP",
        "USE_VERTEX_COLOR",
        "ALPHA_TEST",
        "TRANSPARENT",
        "DOUBLE_SIDED",
        "FLIP_SIDED",
        "LIGHT_MODEL_BASIC",
        "LIGHT_MODEL_LAMBERT",
        "LIGHT_MODEL_PHONG",
        "LIGHT_MODEL_STANDARD",
        // Geometry
        "HAS_NORMAL",
        "HAS_UV",
        "HAS_COLOR",
        "HAS_TANGENT",
        "HAS_SKINNING",
        // Lights
        "NUM_DIR_LIGHTS",
        "NUM_POINT_LIGHTS",
        "NUM_SPOT_LIGHTS",
        "NUM_AREA_LIGHTS",
        // Values
        "0",
        "1",
    ];

    for name in common {
        intern(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let a = intern("strata_interner_a");
        let b = intern("strata_interner_a");
        let c = intern("strata_interner_b");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(resolve(a), "strata_interner_a");
    }

    #[test]
    fn get_does_not_intern() {
        assert!(get("strata_interner_never_seen").is_none());
        let _ = intern("strata_interner_seen");
        assert!(get("strata_interner_seen").is_some());
    }
}
