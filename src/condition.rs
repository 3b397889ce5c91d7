//! Declarative conditions and presets.
//!
//! A [`Condition`] is the record form of a single `@if` block: it compares
//! one HSL component of a palette channel against a threshold and selects a
//! CSS snippet. A [`Preset`] bundles base CSS with a list of conditions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast::number_text;
use crate::color::{Channel, Component, Palette};
use crate::template::Compiler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Comparison {
    Equal,
    GreaterThan,
    LessThan,
}

impl Comparison {
    pub const ALL: [Comparison; 3] = [
        Comparison::Equal,
        Comparison::GreaterThan,
        Comparison::LessThan,
    ];

    /// The word operator guards use for this comparison.
    pub fn name(self) -> &'static str {
        match self {
            Comparison::Equal => "equal",
            Comparison::GreaterThan => "greaterThan",
            Comparison::LessThan => "lessThan",
        }
    }

    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Equal => lhs == rhs,
            Comparison::GreaterThan => lhs > rhs,
            Comparison::LessThan => lhs < rhs,
        }
    }
}

/// A guard variable such as `accent_l`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GuardVariable {
    pub channel: Channel,
    pub component: Component,
}

impl fmt::Display for GuardVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.channel, self.component.suffix())
    }
}

impl FromStr for GuardVariable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (channel, component) = s
            .rsplit_once(['_', '-'])
            .ok_or_else(|| format!("expected channel_component, found {s:?}"))?;
        Ok(Self {
            channel: channel.parse()?,
            component: component.parse()?,
        })
    }
}

impl TryFrom<String> for GuardVariable {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GuardVariable> for String {
    fn from(value: GuardVariable) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub variable: GuardVariable,
    pub comparison: Comparison,
    pub threshold: f64,
    pub if_true: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_false: Option<String>,
}

impl Condition {
    pub fn holds(&self, palette: &Palette, compiler: &Compiler) -> bool {
        let value = compiler
            .channel_hsl(palette, self.variable.channel)
            .component(self.variable.component);
        self.comparison.apply(value, self.threshold)
    }

    /// The selected snippet, compiled against `palette`. Empty when no branch
    /// applies or the palette is inactive.
    pub fn compile(&self, palette: &Palette, compiler: &Compiler) -> String {
        if !palette.is_active() {
            return String::new();
        }
        let holds = self.holds(palette, compiler);
        debug!(variable = %self.variable, holds, "condition");
        let css = if holds {
            Some(&self.if_true)
        } else {
            self.if_false.as_ref()
        };
        css.map(|css| compiler.compile(css, palette))
            .unwrap_or_default()
    }

    /// The equivalent `@if` directive.
    pub fn to_directive(&self) -> String {
        let mut out = format!(
            "@if({} {} {}) {{\n{}\n}}",
            self.variable,
            self.comparison.name(),
            number_text(self.threshold),
            self.if_true
        );
        if let Some(otherwise) = &self.if_false {
            out.push_str(&format!(" @else {{\n{otherwise}\n}}"));
        }
        out.push_str(" @end-if();");
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub name: String,
    pub css: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Preset {
    /// Base CSS followed by every applicable condition, one per line.
    pub fn compile(&self, palette: &Palette, compiler: &Compiler) -> String {
        std::iter::once(compiler.compile(&self.css, palette))
            .chain(self.conditions.iter().map(|c| c.compile(palette, compiler)))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_variable_names() {
        let var: GuardVariable = "accent_l".parse().unwrap();
        assert_eq!(var.channel, Channel::Accent);
        assert_eq!(var.component, Component::L);
        assert_eq!(var.to_string(), "accent_l");
        assert_eq!("primary-h".parse::<GuardVariable>().unwrap().to_string(), "primary_h");
        assert!("accent".parse::<GuardVariable>().is_err());
        assert!("accent_x".parse::<GuardVariable>().is_err());
    }

    #[test]
    fn comparisons() {
        assert!(Comparison::Equal.apply(1.0, 1.0));
        assert!(Comparison::GreaterThan.apply(2.0, 1.0));
        assert!(!Comparison::LessThan.apply(2.0, 1.0));
    }

    #[test]
    fn condition_from_json() {
        let condition: Condition = serde_json::from_str(
            r#"{"variable":"accent_l","comparison":"greaterThan","threshold":50,"ifTrue":"a{}"}"#,
        )
        .unwrap();
        assert_eq!(condition.comparison, Comparison::GreaterThan);
        assert_eq!(condition.if_false, None);
        assert!(serde_json::from_str::<Condition>(
            r#"{"variable":"nope","comparison":"equal","threshold":0,"ifTrue":""}"#
        )
        .is_err());
    }

    #[test]
    fn non_finite_thresholds_render_as_expressions() {
        let compiler = Compiler::default();
        let palette = Palette::new("p").with(Channel::Accent, "#5865f2");
        for (threshold, comparison) in [
            (f64::INFINITY, Comparison::LessThan),
            (f64::NEG_INFINITY, Comparison::GreaterThan),
            (f64::NAN, Comparison::Equal),
            (-5.0, Comparison::GreaterThan),
        ] {
            let condition = Condition {
                variable: "accent_l".parse().unwrap(),
                comparison,
                threshold,
                if_true: "yes".into(),
                if_false: Some("no".into()),
            };
            assert_eq!(
                compiler.compile(&condition.to_directive(), &palette),
                condition.compile(&palette, &compiler),
                "{threshold}"
            );
        }
    }

    #[test]
    fn directive_agrees_with_record() {
        let compiler = Compiler::default();
        let palette = Palette::new("p").with(Channel::Accent, "#5865f2");
        let condition = Condition {
            variable: "accent_l".parse().unwrap(),
            comparison: Comparison::GreaterThan,
            threshold: 50.0,
            if_true: "light".into(),
            if_false: Some("dark".into()),
        };
        assert_eq!(condition.compile(&palette, &compiler), "light");
        assert_eq!(
            compiler.compile(&condition.to_directive(), &palette),
            "light"
        );
    }
}
