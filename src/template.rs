//! Palette-driven CSS template compiler.
//!
//! Two directive forms are expanded:
//!
//! - `colorway(channel[-h|-s|-l][, fallback])` is replaced by the channel's
//!   hex colour or one of its HSL components.
//! - `@if(guard) { ... } [@else { ... }] @end-if();` keeps the body whose
//!   branch the guard selects. Blocks nest; matching is done by depth.
//!
//! Afterwards `--colorwayVar name value;` declarations are collected into one
//! `:root:root` block at the top of the output.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::color::{Channel, Component, Hsl, Palette};
use crate::condition::Comparison;
use crate::error::{ConfigError, TemplateError};
use crate::eval::{Bindings, Value};
use crate::ops::{precedence, Assoc, Grammar, GrammarOptions};
use crate::parser::ExpressionParser;

const IF_OPEN: &str = "@if(";
const ELSE: &str = "@else";
const END_IF: &str = "@end-if();";

/// Colours used for channels a palette does not set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelDefaults {
    pub accent: String,
    pub primary: String,
    pub secondary: String,
    pub tertiary: String,
}

impl Default for ChannelDefaults {
    fn default() -> Self {
        Self {
            accent: Channel::Accent.default_color().to_string(),
            primary: Channel::Primary.default_color().to_string(),
            secondary: Channel::Secondary.default_color().to_string(),
            tertiary: Channel::Tertiary.default_color().to_string(),
        }
    }
}

impl ChannelDefaults {
    pub fn get(&self, channel: Channel) -> &str {
        match channel {
            Channel::Accent => &self.accent,
            Channel::Primary => &self.primary,
            Channel::Secondary => &self.secondary,
            Channel::Tertiary => &self.tertiary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub max_depth: usize,
    pub defaults: ChannelDefaults,
    pub expression: GrammarOptions,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            defaults: ChannelDefaults::default(),
            expression: GrammarOptions::default(),
        }
    }
}

impl CompilerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        if config.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be at least 1".into()));
        }
        for channel in Channel::ALL {
            let color = config.defaults.get(channel);
            if Hsl::from_hex(color).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "default {channel} colour {color:?} is not a hex colour"
                )));
            }
        }
        Ok(config)
    }
}

/// The standard grammar plus `equal`, `greaterThan` and `lessThan` word
/// operators for guards.
pub fn guard_grammar(options: GrammarOptions) -> Grammar {
    Comparison::ALL
        .into_iter()
        .fold(Grammar::standard().with_options(options), |grammar, cmp| {
            grammar.with_binary(cmp.name(), precedence::COMPARE, Assoc::Left, move |a, b| {
                Ok(Value::Bool(
                    cmp.apply(a.as_number(cmp.name())?, b.as_number(cmp.name())?),
                ))
            })
        })
}

struct Block<'t> {
    guard: &'t str,
    then: &'t str,
    otherwise: Option<&'t str>,
    end: usize,
}

#[derive(Debug, Clone)]
pub struct Compiler {
    config: CompilerConfig,
    parser: ExpressionParser,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        let parser = ExpressionParser::new(guard_grammar(config.expression.clone()));
        Self { config, parser }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compiles `css`, degrading instead of failing: structural errors are
    /// logged and the text is returned with only inline substitutions made.
    pub fn compile(&self, css: &str, palette: &Palette) -> String {
        self.try_compile(css, palette).unwrap_or_else(|err| {
            warn!(error = %err, "template could not be expanded; using inline substitutions only");
            self.substitute(css, palette)
        })
    }

    /// Compiles `css`, reporting unbalanced or malformed directives.
    /// Guard evaluation failures are never errors; such guards are false.
    pub fn try_compile(&self, css: &str, palette: &Palette) -> Result<String, TemplateError> {
        let substituted = self.substitute(css, palette);
        if !palette.is_active() {
            let stripped = self.expand(&substituted, None, 0)?;
            return Ok(var_pattern().replace_all(&stripped, "").into_owned());
        }

        let bindings = self.guard_bindings(palette);
        let expanded = self.expand(&substituted, Some(&bindings), 0)?;
        Ok(hoist(&expanded))
    }

    /// Replaces every `colorway(...)` call.
    pub fn substitute(&self, css: &str, palette: &Palette) -> String {
        inline_pattern()
            .replace_all(css, |caps: &Captures<'_>| self.inline_value(caps, palette))
            .into_owned()
    }

    pub fn channel_hsl(&self, palette: &Palette, channel: Channel) -> Hsl {
        let default = || Hsl::from_hex(self.config.defaults.get(channel)).unwrap_or(Hsl {
            h: 0.0,
            s: 0.0,
            l: 0.0,
        });
        match palette.get(channel) {
            Some(hex) => Hsl::from_hex(hex).unwrap_or_else(|err| {
                warn!(%channel, error = %err, "palette colour is not valid hex");
                default()
            }),
            None => default(),
        }
    }

    pub fn guard_bindings(&self, palette: &Palette) -> Bindings {
        let mut bindings = Bindings::new();
        for channel in Channel::ALL {
            let hex = palette
                .get(channel)
                .unwrap_or_else(|| self.config.defaults.get(channel));
            bindings.insert(channel.name().to_string(), Value::from(hex));
            let hsl = self.channel_hsl(palette, channel);
            for component in Component::ALL {
                bindings.insert(
                    format!("{}_{}", channel.name(), component.suffix()),
                    Value::Number(hsl.component(component)),
                );
            }
        }
        bindings
    }

    /// Evaluates a guard. Parse and evaluation errors make it false.
    pub fn guard_holds(&self, guard: &str, bindings: &Bindings) -> bool {
        let result = self
            .parser
            .parse(guard)
            .map_err(|err| err.to_string())
            .and_then(|expr| expr.evaluate(bindings).map_err(|err| err.to_string()));
        match result {
            Ok(value) => {
                trace!(guard, %value, "guard evaluated");
                value.is_truthy()
            }
            Err(error) => {
                warn!(guard, %error, "guard failed; treating it as false");
                false
            }
        }
    }

    fn inline_value(&self, caps: &Captures<'_>, palette: &Palette) -> String {
        let Some(channel) = caps.get(1).and_then(|m| m.as_str().parse::<Channel>().ok()) else {
            return caps[0].to_string();
        };
        let component = caps.get(2).and_then(|m| m.as_str().parse::<Component>().ok());
        let fallback = caps.get(3).map(|m| m.as_str().trim()).filter(|s| !s.is_empty());

        // An inactive palette contributes no colours of its own.
        let hex = palette.get(channel).filter(|_| palette.is_active());
        match (hex, component) {
            (Some(hex), None) => hex.to_string(),
            (Some(hex), Some(component)) => match Hsl::from_hex(hex) {
                Ok(hsl) => hsl.component(component).to_string(),
                Err(err) => {
                    warn!(%channel, error = %err, "palette colour is not valid hex");
                    self.fallback(channel, component, fallback)
                }
            },
            (None, None) => fallback
                .unwrap_or_else(|| self.config.defaults.get(channel))
                .to_string(),
            (None, Some(component)) => self.fallback(channel, component, fallback),
        }
    }

    fn fallback(&self, channel: Channel, component: Component, fallback: Option<&str>) -> String {
        match fallback {
            Some(text) => text.to_string(),
            None => Hsl::from_hex(self.config.defaults.get(channel))
                .map(|hsl| hsl.component(component).to_string())
                .unwrap_or_default(),
        }
    }

    fn expand(
        &self,
        text: &str,
        bindings: Option<&Bindings>,
        depth: usize,
    ) -> Result<String, TemplateError> {
        if depth > self.config.max_depth {
            return Err(TemplateError::TooDeep(self.config.max_depth));
        }

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        loop {
            let rest = &text[cursor..];
            let open = rest.find(IF_OPEN);
            if let Some(close) = rest.find(END_IF) {
                if open.map_or(true, |open| close < open) {
                    return Err(TemplateError::Unbalanced {
                        marker: END_IF,
                        position: cursor + close,
                    });
                }
            }
            let Some(open) = open else {
                out.push_str(rest);
                return Ok(out);
            };

            out.push_str(&rest[..open]);
            let block = parse_block(text, cursor + open)?;
            if let Some(bindings) = bindings {
                let holds = self.guard_holds(block.guard, bindings);
                debug!(guard = block.guard, holds, "conditional block");
                let body = if holds { Some(block.then) } else { block.otherwise };
                if let Some(body) = body {
                    out.push_str(&self.expand(body, Some(bindings), depth + 1)?);
                }
            } else {
                // Still walk the bodies so nesting problems surface.
                self.expand(block.then, None, depth + 1)?;
                if let Some(otherwise) = block.otherwise {
                    self.expand(otherwise, None, depth + 1)?;
                }
            }
            cursor = block.end;
        }
    }
}

/// Moves `--colorwayVar name value;` declarations into a `:root:root` block
/// at the top of the output.
fn hoist(text: &str) -> String {
    let pattern = var_pattern();
    let declarations: Vec<(&str, &str)> = pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().trim_start_matches('-');
            let value = caps.get(2)?.as_str().trim();
            Some((name, value))
        })
        .collect();
    if declarations.is_empty() {
        return text.to_string();
    }

    let mut out = String::from(":root:root {\n");
    for (name, value) in &declarations {
        debug!(name, value, "hoisting colorway variable");
        out.push_str(&format!("    --{name}: {value};\n"));
    }
    out.push_str("}\n");
    out.push_str(&pattern.replace_all(text, ""));
    out
}

fn inline_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"colorway\(\s*(accent|primary|secondary|tertiary)(?:-([hsl]))?\s*(?:,\s*([^()]*?))?\s*\)",
        )
        .expect("inline substitution pattern is valid")
    })
}

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"--colorwayVar\s+([\w-]+)\s+([^;]*);")
            .expect("variable declaration pattern is valid")
    })
}

fn parse_block(text: &str, start: usize) -> Result<Block<'_>, TemplateError> {
    let guard_start = start + IF_OPEN.len();
    let guard_end = matching_paren(text, guard_start).ok_or_else(|| {
        TemplateError::MalformedDirective {
            position: start,
            reason: "guard has no closing ')'".to_string(),
        }
    })?;

    let after_guard = &text[guard_end + 1..];
    let skipped = after_guard.len() - after_guard.trim_start().len();
    let brace = guard_end + 1 + skipped;
    if !text[brace..].starts_with('{') {
        return Err(TemplateError::MalformedDirective {
            position: brace,
            reason: "expected '{' after guard".to_string(),
        });
    }
    let body_start = brace + 1;

    let mut depth = 0usize;
    let mut pos = body_start;
    let mut else_at = None;
    let body_end = loop {
        let rest = &text[pos..];
        let next = [IF_OPEN, END_IF, ELSE]
            .into_iter()
            .filter_map(|marker| rest.find(marker).map(|at| (at, marker)))
            .min_by_key(|(at, _)| *at);
        let Some((at, marker)) = next else {
            return Err(TemplateError::Unbalanced {
                marker: IF_OPEN,
                position: start,
            });
        };
        let at = pos + at;
        pos = at + marker.len();
        match marker {
            IF_OPEN => depth += 1,
            END_IF if depth == 0 => break at,
            END_IF => depth -= 1,
            _ if depth == 0 && else_at.is_none() => else_at = Some(at),
            _ => {}
        }
    };

    let then = strip_braces(&text[body_start..else_at.unwrap_or(body_end)], false);
    let otherwise = else_at.map(|at| strip_braces(&text[at + ELSE.len()..body_end], true));

    Ok(Block {
        guard: &text[guard_start..guard_end],
        then,
        otherwise,
        end: body_end + END_IF.len(),
    })
}

fn strip_braces(body: &str, has_open: bool) -> &str {
    let mut body = body.trim();
    if has_open {
        body = body.strip_prefix('{').unwrap_or(body);
    }
    body.strip_suffix('}').unwrap_or(body).trim()
}

fn matching_paren(text: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text[from..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' if depth == 0 => return Some(from + i),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> Palette {
        Palette::new("test")
            .with(Channel::Accent, "#5865f2")
            .with(Channel::Primary, "#313338")
            .with(Channel::Secondary, "#2b2d31")
            .with(Channel::Tertiary, "#1e1f22")
    }

    #[test]
    fn inline_hex_and_components() {
        let c = Compiler::default();
        assert_eq!(c.substitute("color: colorway(accent);", &palette()), "color: #5865f2;");
        assert_eq!(
            c.substitute("hsl(colorway(accent-h) colorway(accent-s)% colorway( accent-l )%)", &palette()),
            "hsl(235 86% 65%)"
        );
    }

    #[test]
    fn inline_fallbacks() {
        let c = Compiler::default();
        let sparse = Palette::new("sparse").with(Channel::Accent, "#ff0000");
        assert_eq!(c.substitute("colorway(primary, #123456)", &sparse), "#123456");
        assert_eq!(c.substitute("colorway(primary)", &sparse), "#313338");
        assert_eq!(c.substitute("colorway(tertiary-l)", &sparse), "13");
        assert_eq!(c.substitute("colorway(tertiary-l, 50)", &sparse), "50");
        assert_eq!(c.substitute("colorway(accent, #000)", &sparse), "#ff0000");
    }

    #[test]
    fn unknown_channels_are_left_alone() {
        let c = Compiler::default();
        assert_eq!(c.substitute("colorway(quaternary)", &palette()), "colorway(quaternary)");
    }

    #[test]
    fn block_parsing() {
        let text = "@if(a > (1)) { x @if(b) { y } @end-if(); } @else { z } @end-if(); tail";
        let block = parse_block(text, 0).unwrap();
        assert_eq!(block.guard, "a > (1)");
        assert_eq!(block.then, "x @if(b) { y } @end-if();");
        assert_eq!(block.otherwise, Some("z"));
        assert_eq!(&text[block.end..], " tail");
    }

    #[test]
    fn guard_parens_inside_strings() {
        let text = r#"@if(accent == ")") { x } @end-if();"#;
        assert_eq!(parse_block(text, 0).unwrap().guard, r#"accent == ")""#);
    }

    #[test]
    fn structural_errors() {
        let c = Compiler::default();
        assert!(matches!(
            c.try_compile("@if(1) { a ", &palette()),
            Err(TemplateError::Unbalanced { marker: IF_OPEN, .. })
        ));
        assert!(matches!(
            c.try_compile("a } @end-if();", &palette()),
            Err(TemplateError::Unbalanced { marker: END_IF, position: 4 })
        ));
        assert!(matches!(
            c.try_compile("@if(1 a } @end-if();", &palette()),
            Err(TemplateError::MalformedDirective { .. })
        ));
        assert!(matches!(
            c.try_compile("@if(1) a @end-if();", &palette()),
            Err(TemplateError::MalformedDirective { .. })
        ));
    }

    #[test]
    fn nesting_is_bounded() {
        let config = CompilerConfig {
            max_depth: 2,
            ..CompilerConfig::default()
        };
        let c = Compiler::new(config);
        let nested = "@if(1) { @if(1) { @if(1) { deep } @end-if(); } @end-if(); } @end-if();";
        assert_eq!(c.try_compile(nested, &palette()), Err(TemplateError::TooDeep(2)));
        let shallow = "@if(1) { @if(1) { ok } @end-if(); } @end-if();";
        assert_eq!(c.try_compile(shallow, &palette()).unwrap(), "ok");
    }

    #[test]
    fn guard_bindings_cover_every_channel() {
        let bindings = Compiler::default().guard_bindings(&palette());
        assert_eq!(bindings.len(), 16);
        assert_eq!(bindings["accent_h"], Value::Number(235.0));
        assert_eq!(bindings["tertiary"], Value::from("#1e1f22"));
    }

    #[test]
    fn config_from_toml() {
        let config = CompilerConfig::from_toml_str(
            r##"
max_depth = 4

[defaults]
accent = "#ff0000"

[expression]
member_access = false
"##,
        )
        .unwrap();
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.defaults.accent, "#ff0000");
        assert_eq!(config.defaults.primary, "#313338");
        assert!(!config.expression.member_access);
        assert_eq!(config.expression.max_depth, 64);

        assert!(CompilerConfig::from_toml_str("max_depth = 0").is_err());
        assert!(CompilerConfig::from_toml_str("[defaults]\naccent = \"blue\"").is_err());
        assert!(matches!(
            CompilerConfig::from_toml_str("max_depth = \"deep\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
