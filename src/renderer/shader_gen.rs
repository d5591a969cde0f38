//! Shader Source Generator
//!
//! Renders GLSL ES 3.0 source from the embedded templates under
//! `src/renderer/shaders`. The template syntax is configured so it does not
//! clash with GLSL:
//!
//! - `{$ ... $}` block tags (`{$ include "lights.glsl" $}`)
//! - `$$` line statements (`$$ if HAS_MAP`)
//! - `{{ ... }}` expressions (`[{{ NUM_DIR_LIGHTS }}]`)
//!
//! Every render option is available to the templates by name, and the same
//! options are prepended to both stages as `#define` lines.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, Value};
use rust_embed::RustEmbed;

use crate::errors::{Result, StrataError};
use crate::resources::render_options::RenderOptions;

/// Template of the debug program drawn in place of failed variants.
pub const FALLBACK_SHADER: &str = "fallback";

const GLSL_VERSION: &str = "#version 300 es\n";

#[derive(RustEmbed)]
#[folder = "src/renderer/shaders"]
struct ShaderAssets;

static SHADER_ENV: OnceLock<Environment<'static>> = OnceLock::new();

/// Generated source for both stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

fn environment() -> &'static Environment<'static> {
    SHADER_ENV.get_or_init(|| {
        let mut env = Environment::new();

        match SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()
        {
            Ok(syntax) => env.set_syntax(syntax),
            Err(err) => log::error!("Shader template syntax rejected: {err}"),
        }
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.set_loader(shader_loader);
        env
    })
}

fn shader_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    #[cfg(debug_assertions)]
    {
        let path = std::path::Path::new("src/renderer/shaders").join(name);
        if path.exists() {
            return std::fs::read_to_string(&path)
                .map(Some)
                .map_err(|e| Error::new(ErrorKind::TemplateNotFound, format!("Failed to read file: {e}")));
        }
    }

    Ok(ShaderAssets::get(name).and_then(|file| String::from_utf8(file.data.into_owned()).ok()))
}

fn render(name: &str, context: &BTreeMap<String, Value>) -> Result<String> {
    let template = environment().get_template(name).map_err(|err| match err.kind() {
        ErrorKind::TemplateNotFound => StrataError::TemplateNotFound(name.to_owned()),
        _ => StrataError::Template(err),
    })?;
    Ok(template.render(context)?)
}

/// Template names for the two stages of `shader`.
fn stage_templates(shader: &str) -> (String, String) {
    if shader == FALLBACK_SHADER {
        (format!("{FALLBACK_SHADER}.vert"), format!("{FALLBACK_SHADER}.frag"))
    } else {
        ("mesh.vert".to_owned(), format!("{shader}.frag"))
    }
}

/// Generates both stages of `shader` for `options`.
pub fn generate(shader: &str, options: &RenderOptions) -> Result<ShaderSource> {
    let (vertex_name, fragment_name) = stage_templates(shader);
    let context = options.to_template_context();

    let vertex = render(&vertex_name, &context)?;
    let fragment = render(&fragment_name, &context)?;

    let defines = options.to_define_block();
    Ok(ShaderSource {
        vertex: format!("{GLSL_VERSION}{defines}{vertex}"),
        fragment: format!("{GLSL_VERSION}{defines}precision highp float;\n{fragment}"),
    })
}

/// Whether an embedded template exists for `shader`'s fragment stage.
#[must_use]
pub fn has_template(shader: &str) -> bool {
    let (_, fragment) = stage_templates(shader);
    ShaderAssets::get(&fragment).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit_options(dir_lights: usize) -> RenderOptions {
        let mut options = RenderOptions::new();
        options.set_flag("LIGHT_MODEL_LAMBERT");
        options.set_count("NUM_DIR_LIGHTS", dir_lights);
        options.set_count("NUM_POINT_LIGHTS", 0);
        options.set_count("NUM_SPOT_LIGHTS", 0);
        options.set_count("NUM_AREA_LIGHTS", 0);
        options
    }

    #[test]
    fn defines_are_prepended() {
        let options = RenderOptions::from_iter([("HAS_MAP", "1"), ("HAS_UV", "1")]);
        let source = generate("mesh_basic", &options).unwrap();
        assert!(source.vertex.starts_with("#version 300 es\n#define HAS_MAP 1\n"));
        assert!(source.fragment.contains("uniform sampler2D map;"));
    }

    #[test]
    fn light_arrays_follow_counts() {
        let source = generate("mesh_lambert", &lit_options(2)).unwrap();
        assert!(source.fragment.contains("directionalLightDirection[2]"));

        let unlit = generate("mesh_lambert", &lit_options(0)).unwrap();
        assert!(!unlit.fragment.contains("directionalLightDirection"));
    }

    #[test]
    fn every_built_in_model_renders() {
        for shader in ["mesh_basic", "mesh_lambert", "mesh_phong", "mesh_standard", FALLBACK_SHADER] {
            assert!(has_template(shader), "{shader}");
            generate(shader, &lit_options(1)).unwrap();
        }
    }

    #[test]
    fn missing_template_is_reported() {
        let err = generate("mesh_toon", &RenderOptions::new()).unwrap_err();
        assert!(matches!(err, StrataError::TemplateNotFound(name) if name == "mesh_toon.frag"));
    }
}
