//! Naming scheme templates
//!
//! ```text
//! <:umlauts><firstname>[0].<lastname>[COUNTER2]
//! ```
//!
//! - `<attr>` is replaced by the attribute value, `<attr>[n]` by its n-th
//!   character and `<attr>[a:b]` by characters `a..b` (either bound may be
//!   omitted).
//! - `<:umlauts>`, `<:lower>` and `<:upper>` modify the whole result.
//! - `[COUNTER2]` and `[ALWAYSCOUNTER]` mark where the collision counter goes.
//! - `[YYYY]`, `[YY]`, `[MM]` and `[DD]` are today's date.
//!
//! Anything else is literal text.

use chrono::{Datelike, NaiveDate};
use regex_lite::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::{Error, Result};

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<(:?)([A-Za-z0-9_]+)>(?:\[(\d*)(:?)(\d*)\])?|\[(?i:(COUNTER2|ALWAYSCOUNTER|YYYY|YY|MM|DD))\]",
    )
    .expect("valid regex")
});

fn is_counter_keyword(keyword: &str) -> bool {
    keyword.eq_ignore_ascii_case("COUNTER2") || keyword.eq_ignore_ascii_case("ALWAYSCOUNTER")
}

/// Number of counter tokens in a template
pub fn counter_tokens(template: &str) -> usize {
    TOKEN_PATTERN
        .captures_iter(template)
        .filter(|c| c.get(6).is_some_and(|k| is_counter_keyword(k.as_str())))
        .count()
}

/// Kind of collision counter in a scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// Empty on the first attempt, then 1, 2, …
    Counter2,
    /// 1 on the first attempt, then 2, 3, …
    Always,
}

impl CounterKind {
    /// Counter text for attempt `attempt` (0-based), zero-padded to `width`
    pub fn render(&self, attempt: usize, width: usize) -> String {
        let value = match self {
            CounterKind::Counter2 if attempt == 0 => return String::new(),
            CounterKind::Counter2 => attempt,
            CounterKind::Always => attempt + 1,
        };
        format!("{:0width$}", value, width = width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    Umlauts,
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatePart {
    Year,
    ShortYear,
    Month,
    Day,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Attribute {
        name: String,
        start: Option<usize>,
        end: Option<usize>,
    },
    Counter,
    Date(DatePart),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheme {
    template: String,
    tokens: Vec<Token>,
    modifiers: Vec<Modifier>,
    counter: Option<CounterKind>,
}

/// Values a scheme is rendered against
#[derive(Debug, Clone)]
pub struct SchemeContext<'a> {
    pub attributes: &'a BTreeMap<String, String>,
    pub today: NaiveDate,
}

/// Result of rendering a scheme, split around the counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub before: String,
    pub after: String,
}

impl Rendered {
    /// Join with counter text
    pub fn with_counter(&self, counter: &str) -> String {
        format!("{}{}{}", self.before, counter, self.after)
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

impl Scheme {
    /// Parse a template
    ///
    /// # Errors
    ///
    /// `Error::Format` for an unknown modifier or more than one counter.
    pub fn parse(template: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut modifiers = Vec::new();
        let mut counter = None;
        let mut last = 0;

        for caps in TOKEN_PATTERN.captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                tokens.push(Token::Literal(template[last..whole.start()].to_string()));
            }
            last = whole.end();

            if let Some(keyword) = caps.get(6) {
                let token = match keyword.as_str().to_uppercase().as_str() {
                    "COUNTER2" => Some(CounterKind::Counter2),
                    "ALWAYSCOUNTER" => Some(CounterKind::Always),
                    "YYYY" => {
                        tokens.push(Token::Date(DatePart::Year));
                        None
                    }
                    "YY" => {
                        tokens.push(Token::Date(DatePart::ShortYear));
                        None
                    }
                    "MM" => {
                        tokens.push(Token::Date(DatePart::Month));
                        None
                    }
                    _ => {
                        tokens.push(Token::Date(DatePart::Day));
                        None
                    }
                };
                if let Some(kind) = token {
                    if counter.is_some() {
                        return Err(Error::format(format!(
                            "more than one counter in scheme '{}'",
                            template
                        )));
                    }
                    counter = Some(kind);
                    tokens.push(Token::Counter);
                }
                continue;
            }

            let name = caps.get(2).map_or("", |m| m.as_str());
            if caps.get(1).is_some_and(|m| !m.as_str().is_empty()) {
                modifiers.push(match name {
                    "umlauts" => Modifier::Umlauts,
                    "lower" => Modifier::Lower,
                    "upper" => Modifier::Upper,
                    other => {
                        return Err(Error::format(format!(
                            "unknown modifier '<:{}>' in scheme '{}'",
                            other, template
                        )));
                    }
                });
                continue;
            }

            let (start, end) = match caps.get(3) {
                Some(_) => {
                    let start = caps.get(3).and_then(|m| m.as_str().parse().ok());
                    let ranged = caps.get(4).is_some_and(|m| !m.as_str().is_empty());
                    let end = caps.get(5).and_then(|m| m.as_str().parse().ok());
                    if ranged {
                        (start, end)
                    } else {
                        // `[n]` selects a single character
                        let index = start.unwrap_or(0);
                        (Some(index), Some(index + 1))
                    }
                }
                None => (None, None),
            };
            tokens.push(Token::Attribute {
                name: name.to_string(),
                start,
                end,
            });
        }

        if last < template.len() {
            tokens.push(Token::Literal(template[last..].to_string()));
        }

        Ok(Self {
            template: template.to_string(),
            tokens,
            modifiers,
            counter,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Counter kind, if the scheme has one
    pub fn counter(&self) -> Option<CounterKind> {
        self.counter
    }

    /// Force transliteration of umlauts
    pub fn with_umlauts(mut self) -> Self {
        if !self.modifiers.contains(&Modifier::Umlauts) {
            self.modifiers.insert(0, Modifier::Umlauts);
        }
        self
    }

    /// Render everything but the counter
    pub fn render(&self, ctx: &SchemeContext<'_>) -> Rendered {
        let mut rendered = Rendered::default();
        let mut past_counter = false;

        for token in &self.tokens {
            let text = match token {
                Token::Literal(text) => text.clone(),
                Token::Attribute { name, start, end } => {
                    let value = ctx.attributes.get(name).map(String::as_str).unwrap_or("");
                    slice_chars(value, *start, *end)
                }
                Token::Date(part) => match part {
                    DatePart::Year => format!("{:04}", ctx.today.year()),
                    DatePart::ShortYear => format!("{:02}", ctx.today.year().rem_euclid(100)),
                    DatePart::Month => format!("{:02}", ctx.today.month()),
                    DatePart::Day => format!("{:02}", ctx.today.day()),
                },
                Token::Counter => {
                    past_counter = true;
                    continue;
                }
            };
            if past_counter {
                rendered.after.push_str(&text);
            } else {
                rendered.before.push_str(&text);
            }
        }

        for modifier in &self.modifiers {
            let apply = |s: &str| match modifier {
                Modifier::Umlauts => transliterate(s),
                Modifier::Lower => s.to_lowercase(),
                Modifier::Upper => s.to_uppercase(),
            };
            rendered.before = apply(&rendered.before);
            rendered.after = apply(&rendered.after);
        }

        rendered
    }

    /// Render to a single value, with an empty counter
    ///
    /// # Errors
    ///
    /// `Error::Format` if the result is empty.
    pub fn render_value(&self, ctx: &SchemeContext<'_>) -> Result<String> {
        let rendered = self.render(ctx);
        if rendered.is_empty() {
            return Err(Error::format(format!(
                "scheme '{}' rendered to an empty value",
                self.template
            )));
        }
        Ok(rendered.with_counter(""))
    }
}

fn slice_chars(value: &str, start: Option<usize>, end: Option<usize>) -> String {
    let start = start.unwrap_or(0);
    let chars = value.chars().skip(start);
    match end {
        Some(end) => chars.take(end.saturating_sub(start)).collect(),
        None => chars.collect(),
    }
}

/// Replace umlauts and common accented letters by ASCII
pub fn transliterate(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'Ä' => out.push_str("Ae"),
            'Ö' => out.push_str("Oe"),
            'Ü' => out.push_str("Ue"),
            'ß' => out.push_str("ss"),
            'á' | 'à' | 'â' | 'å' | 'ã' => out.push('a'),
            'Á' | 'À' | 'Â' | 'Å' | 'Ã' => out.push('A'),
            'é' | 'è' | 'ê' | 'ë' => out.push('e'),
            'É' | 'È' | 'Ê' | 'Ë' => out.push('E'),
            'í' | 'ì' | 'î' | 'ï' => out.push('i'),
            'Í' | 'Ì' | 'Î' | 'Ï' => out.push('I'),
            'ó' | 'ò' | 'ô' | 'õ' | 'ø' => out.push('o'),
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ø' => out.push('O'),
            'ú' | 'ù' | 'û' => out.push('u'),
            'Ú' | 'Ù' | 'Û' => out.push('U'),
            'ç' => out.push('c'),
            'Ç' => out.push('C'),
            'ñ' => out.push('n'),
            'Ñ' => out.push('N'),
            other => out.push(other),
        }
    }
    out
}
