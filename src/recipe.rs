//! Recipe generation from a list of main ingredients.
//!
//! The model is asked for a bare JSON array, but chat models often wrap it
//! in prose or leave trailing commas. [`parse_recipes`] recovers what it can
//! and reports [`RecipeParse::Unparseable`] with the raw text otherwise.

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Write as _;
use tracing::warn;

use crate::config::Config;
use crate::llm::{ChatMessage, ChatModel, OpenAiCompatClient};

#[derive(Debug, Clone)]
pub struct RecipeRequest {
    pub ingredients: String,
    pub count: u32,
    /// `none` means no dietary restriction.
    pub diet: String,
    /// `Any` means no difficulty target.
    pub difficulty: String,
    pub servings: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ingredient {
    pub name: String,
    pub quantity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    pub title: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub servings: Option<u32>,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<String>,
    pub difficulty: Option<String>,
    pub estimated_time: Option<String>,
    pub notes: Option<String>,
}

/// Accepts `4`, `"4"` or `"4 people"`; anything else becomes `None`.
fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s
            .split_whitespace()
            .next()
            .and_then(|w| w.parse().ok()),
        _ => None,
    })
}

/// Outcome of parsing model output.
#[derive(Debug, Clone, PartialEq)]
pub enum RecipeParse {
    Parsed(Vec<Recipe>),
    Unparseable { raw: String },
}

pub fn build_prompt(req: &RecipeRequest) -> String {
    let diet = if req.diet.trim().eq_ignore_ascii_case("none") || req.diet.trim().is_empty() {
        "no dietary restriction".to_string()
    } else {
        req.diet.trim().to_string()
    };
    let difficulty = if req.difficulty.trim().eq_ignore_ascii_case("any") || req.difficulty.trim().is_empty() {
        "Any difficulty".to_string()
    } else {
        req.difficulty.trim().to_string()
    };

    format!(
        r#"You are an expert chef.

GOAL:
Create complete, practical recipes from the provided main ingredients.

RULES:
- Diet: {diet}. STRICTLY follow this; do NOT include disallowed ingredients.
- Difficulty target: {difficulty}.
- Servings target: approximately {servings} per recipe.
- Treat the provided ingredients as the main components. You may add common/necessary items.
- EVERY ingredient in the output must have a clear quantity and unit.
- Deduplicate ingredients.
- Output MUST be valid JSON ONLY.

JSON SCHEMA (array of objects):
[
  {{
    "title": "string",
    "servings": integer,
    "ingredients": [
      {{"name": "string", "quantity": "string"}}
    ],
    "steps": ["string", "string"],
    "difficulty": "Easy" | "Medium" | "Hard",
    "estimated_time": "string",
    "notes": "string"
  }}
]

Now generate EXACTLY {count} recipes using these main ingredients:
{ingredients}

Return ONLY the JSON array."#,
        diet = diet,
        difficulty = difficulty,
        servings = req.servings,
        count = req.count,
        ingredients = req.ingredients.trim(),
    )
}

/// Best-effort extraction of a recipe array from model output.
///
/// Tries, in order: the whole text as a JSON array; the span from the first
/// `[` that opens an object to the last `]`; that span with trailing commas
/// before `]` or `}` removed.
pub fn parse_recipes(raw: &str) -> RecipeParse {
    let unparseable = || RecipeParse::Unparseable {
        raw: raw.to_string(),
    };
    if raw.trim().is_empty() {
        return unparseable();
    }
    if let Ok(recipes) = serde_json::from_str::<Vec<Recipe>>(raw.trim()) {
        return RecipeParse::Parsed(recipes);
    }
    let Some(span) = array_span(raw) else {
        return unparseable();
    };
    if let Ok(recipes) = serde_json::from_str::<Vec<Recipe>>(span) {
        return RecipeParse::Parsed(recipes);
    }
    match serde_json::from_str::<Vec<Recipe>>(&strip_trailing_commas(span)) {
        Ok(recipes) => RecipeParse::Parsed(recipes),
        Err(_) => unparseable(),
    }
}

fn array_span(raw: &str) -> Option<&str> {
    let start = raw.char_indices().find_map(|(i, c)| {
        (c == '[' && raw[i + 1..].trim_start().starts_with('{')).then_some(i)
    })?;
    let end = raw.rfind(']')?;
    (end > start).then(|| &raw[start..=end])
}

/// Remove commas that are followed only by whitespace and a closing bracket.
///
/// Commas inside string literals are left alone.
fn strip_trailing_commas(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    // whitespace seen since an unresolved comma outside a string
    let mut pending: Option<String> = None;
    let mut in_string = false;
    let mut escaped = false;

    for c in json.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if let Some(gap) = pending.as_mut() {
            if c.is_whitespace() {
                gap.push(c);
                continue;
            }
            let gap = pending.take().unwrap_or_default();
            if !matches!(c, ']' | '}') {
                out.push(',');
            }
            out.push_str(&gap);
        }
        match c {
            ',' => pending = Some(String::new()),
            '"' => {
                in_string = true;
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    if let Some(gap) = pending {
        out.push(',');
        out.push_str(&gap);
    }
    out
}

/// Ask the configured model for recipes and print them.
pub async fn run_recipe(config: &Config, req: &RecipeRequest, json: bool) -> Result<()> {
    let client = OpenAiCompatClient::from_config(&config.llm)?;
    let parsed = generate(&client, req).await?;
    match parsed {
        RecipeParse::Parsed(recipes) if json => {
            println!("{}", serde_json::to_string_pretty(&recipes)?);
        }
        RecipeParse::Parsed(recipes) => {
            for recipe in &recipes {
                println!("{}", render(recipe));
            }
        }
        RecipeParse::Unparseable { raw } => {
            eprintln!("warning: the model did not return valid recipe JSON; showing raw output");
            println!("{}", raw.trim_end());
        }
    }
    Ok(())
}

pub async fn generate(model: &dyn ChatModel, req: &RecipeRequest) -> Result<RecipeParse> {
    let reply = model
        .complete(&[ChatMessage::user(build_prompt(req))])
        .await?;
    let parsed = parse_recipes(&reply);
    if let RecipeParse::Unparseable { raw } = &parsed {
        warn!(chars = raw.len(), "recipe output was not valid JSON");
    }
    Ok(parsed)
}

/// Plain-text rendering for the terminal.
pub fn render(recipe: &Recipe) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## {}", if recipe.title.is_empty() { "Untitled recipe" } else { &recipe.title });
    let mut meta = Vec::new();
    if let Some(s) = recipe.servings {
        meta.push(format!("serves {}", s));
    }
    if let Some(d) = &recipe.difficulty {
        meta.push(d.clone());
    }
    if let Some(t) = &recipe.estimated_time {
        meta.push(t.clone());
    }
    if !meta.is_empty() {
        let _ = writeln!(out, "{}", meta.join(" · "));
    }
    if !recipe.ingredients.is_empty() {
        let _ = writeln!(out, "\nIngredients:");
        for ing in &recipe.ingredients {
            let _ = writeln!(out, "  - {} {}", ing.quantity, ing.name);
        }
    }
    if !recipe.steps.is_empty() {
        let _ = writeln!(out, "\nSteps:");
        for (i, step) in recipe.steps.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, step);
        }
    }
    if let Some(notes) = recipe.notes.as_deref().filter(|n| !n.is_empty()) {
        let _ = writeln!(out, "\nNotes: {}", notes);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: &str = r#"[{"title": "Lemon Rice", "servings": 2,
        "ingredients": [{"name": "rice", "quantity": "1 cup"}],
        "steps": ["Cook rice.", "Add lemon."], "difficulty": "Easy"}]"#;

    fn titles(parse: RecipeParse) -> Vec<String> {
        match parse {
            RecipeParse::Parsed(r) => r.into_iter().map(|r| r.title).collect(),
            RecipeParse::Unparseable { raw } => panic!("unparseable: {}", raw),
        }
    }

    #[test]
    fn test_direct_json() {
        assert_eq!(titles(parse_recipes(ONE)), vec!["Lemon Rice"]);
    }

    #[test]
    fn test_array_embedded_in_prose() {
        let raw = format!("Sure! Here are your recipes:\n```json\n{}\n```\nEnjoy!", ONE);
        assert_eq!(titles(parse_recipes(&raw)), vec!["Lemon Rice"]);
    }

    #[test]
    fn test_commas_inside_strings_survive_repair() {
        assert_eq!(
            strip_trailing_commas(r#"["a, ]", "b\", }",]"#),
            r#"["a, ]", "b\", }"]"#
        );
        assert_eq!(strip_trailing_commas("[1,\n  2 ,\n]"), "[1,\n  2 \n]");

        let raw = r#"[{"title": "Salt, pepper, ]", "steps": ["Mix, then serve.",],}]"#;
        match parse_recipes(raw) {
            RecipeParse::Parsed(r) => {
                assert_eq!(r[0].title, "Salt, pepper, ]");
                assert_eq!(r[0].steps, vec!["Mix, then serve."]);
            }
            RecipeParse::Unparseable { raw } => panic!("unparseable: {}", raw),
        }
    }

    #[test]
    fn test_trailing_commas_repaired() {
        let raw = r#"Here: [ {"title": "A", "steps": ["x", "y",],}, {"title": "B"}, ] done"#;
        assert_eq!(titles(parse_recipes(raw)), vec!["A", "B"]);
    }

    #[test]
    fn test_unparseable_keeps_raw() {
        let raw = "I cannot help with that.";
        assert_eq!(
            parse_recipes(raw),
            RecipeParse::Unparseable {
                raw: raw.to_string()
            }
        );
        assert!(matches!(parse_recipes(""), RecipeParse::Unparseable { .. }));
        assert!(matches!(parse_recipes("[1, 2]"), RecipeParse::Unparseable { .. }));
    }

    #[test]
    fn test_lenient_fields() {
        let raw = r#"[{"title": "Soup", "servings": "4 people"}, {"servings": "many"}]"#;
        match parse_recipes(raw) {
            RecipeParse::Parsed(r) => {
                assert_eq!(r[0].servings, Some(4));
                assert_eq!(r[1].servings, None);
                assert!(r[1].steps.is_empty());
            }
            other => panic!("{:?}", other),
        }
    }

    struct Canned(&'static str);

    #[async_trait::async_trait]
    impl ChatModel for Canned {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            assert!(messages[0].content.contains("EXACTLY 1 recipes"));
            Ok(self.0.to_string())
        }

        async fn stream(&self, _messages: &[ChatMessage]) -> Result<crate::llm::TextStream> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_generate_parses_reply() {
        let req = RecipeRequest {
            ingredients: "rice, lemon".to_string(),
            count: 1,
            diet: "none".to_string(),
            difficulty: "Easy".to_string(),
            servings: 2,
        };
        let parsed = generate(&Canned(ONE), &req).await.unwrap();
        assert_eq!(titles(parsed), vec!["Lemon Rice"]);
        let parsed = generate(&Canned("no idea"), &req).await.unwrap();
        assert!(matches!(parsed, RecipeParse::Unparseable { .. }));
    }

    #[test]
    fn test_render() {
        let RecipeParse::Parsed(recipes) = parse_recipes(ONE) else {
            panic!("expected recipes");
        };
        let text = render(&recipes[0]);
        assert!(text.starts_with("## Lemon Rice\nserves 2 · Easy\n"));
        assert!(text.contains("  - 1 cup rice"));
        assert!(text.contains("  2. Add lemon."));
    }

    #[test]
    fn test_prompt_wording() {
        let mut req = RecipeRequest {
            ingredients: "chickpeas, spinach".to_string(),
            count: 3,
            diet: "none".to_string(),
            difficulty: "Any".to_string(),
            servings: 2,
        };
        let p = build_prompt(&req);
        assert!(p.contains("Diet: no dietary restriction."));
        assert!(p.contains("Difficulty target: Any difficulty."));
        assert!(p.contains("EXACTLY 3 recipes"));
        assert!(p.ends_with("Return ONLY the JSON array."));

        req.diet = "vegan".to_string();
        req.difficulty = "Hard".to_string();
        let p = build_prompt(&req);
        assert!(p.contains("Diet: vegan."));
        assert!(p.contains("Difficulty target: Hard."));
    }
}
