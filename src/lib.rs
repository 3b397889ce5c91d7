//! colorway: an expression engine and conditional CSS template compiler for
//! four-colour theme palettes.
//!
//! Two layers:
//!
//! - Expressions. [`ExpressionParser`] turns infix source text into an
//!   [`Expression`], a flat postfix instruction stream bound to the
//!   [`Grammar`] it was parsed with. Expressions can be evaluated,
//!   constant-folded ([`Expression::simplify`]), rewritten
//!   ([`Expression::substitute`]), inspected for free variables and bound
//!   into callables. The grammar's operator and function tables are data, so
//!   callers can add their own.
//! - Templates. [`Compiler`] expands `colorway(...)` calls and
//!   `@if(...) { } @else { } @end-if();` blocks in CSS against a [`Palette`]
//!   of accent, primary, secondary and tertiary colours, then hoists
//!   `--colorwayVar` declarations into one `:root:root` block.
//!
//! Template compilation never fails on a bad guard: a guard that does not
//! parse or evaluate is logged through `tracing` and counts as false. Only
//! structural problems (unbalanced or malformed directives) are errors, and
//! only from [`Compiler::try_compile`].
//!
//! Example:
//!
//! ```
//! use colorway::{compile_template, Channel, Palette};
//!
//! let palette = Palette::new("midnight").with(Channel::Accent, "#5865f2");
//! let css = compile_template(
//!     "@if(accent_l greaterThan 50) { a { color: black; } } @else { a { color: white; } } @end-if();",
//!     &palette,
//! );
//! assert_eq!(css, "a { color: black; }");
//! ```

pub mod ast;
pub mod color;
pub mod condition;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod template;

pub use ast::{Expression, Instruction};
pub use color::{Channel, Component, Hsl, Palette};
pub use condition::{Comparison, Condition, GuardVariable, Preset};
pub use error::{Arity, ColorError, ConfigError, EvalError, ParseError, TemplateError, TokenizeError};
pub use eval::{Bindings, Evaluator, Value};
pub use ops::{Assoc, Function, Grammar, GrammarOptions, Logic};
pub use parser::ExpressionParser;
pub use template::{guard_grammar, ChannelDefaults, Compiler, CompilerConfig};

/// Parse `text` with the standard grammar.
pub fn parse(text: &str) -> Result<Expression, ParseError> {
    ExpressionParser::default().parse(text)
}

/// Compile a CSS template against `palette` with the default configuration.
///
/// Structural template errors are logged and the text is returned with only
/// the inline `colorway(...)` substitutions applied.
pub fn compile_template(css: &str, palette: &Palette) -> String {
    Compiler::default().compile(css, palette)
}
