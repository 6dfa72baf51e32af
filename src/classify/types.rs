use crate::classify::ClassifyError;
use serde::{Deserialize, Deserializer, Serialize};

/// Structured facts extracted from one customer story
///
/// Every field is optional; LLM output routinely omits keys or sends
/// `null` for lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    pub customer_name: Option<String>,
    pub industry: Option<String>,
    pub company_size: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    #[serde(deserialize_with = "nullable_vec")]
    pub use_cases: Vec<String>,
    #[serde(deserialize_with = "nullable_vec")]
    pub outcomes: Vec<Outcome>,
    #[serde(deserialize_with = "nullable_vec")]
    pub personas: Vec<Persona>,
    #[serde(deserialize_with = "nullable_vec")]
    pub tech_stack: Vec<String>,
    pub quoted_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Outcome {
    /// performance, cost_savings, revenue_impact, efficiency or other
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub metric: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    pub title: Option<String>,
    pub name: Option<String>,
    pub seniority: Option<String>,
}

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parses classifier output into a `Classification`
///
/// Markdown code fences and any prose around the outermost JSON object are
/// stripped first.
pub fn parse_classification(response: &str) -> Result<Classification, ClassifyError> {
    let trimmed = response.trim();
    let json = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => {
            return Err(ClassifyError::Parse(format!(
                "no JSON object in response: {}",
                preview(trimmed)
            )))
        }
    };

    serde_json::from_str(json).map_err(|e| {
        ClassifyError::Parse(format!("{} in response: {}", e, preview(trimmed)))
    })
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
