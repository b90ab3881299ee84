use healthres_core::types::RankedMatch;

/// Stands in for the result block when retrieval found nothing.
pub const NO_RESULTS: &str = "No results found.";

const QUERY_SLOT: &str = "{query}";
const RESULTS_SLOT: &str = "{search_results}";

pub const PROMPT_TEMPLATE: &str = "
You are a knowledgeable assistant with access to a database of research papers.\x20
The user asked the following question: \"{query}\"

Based on the query, here are the top results from the research paper database:

{search_results}

Please provide a concise and helpful response to the user based on these results.
";

/// Renders ranked matches into the fixed research-assistant prompt.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    template: String,
}

impl Default for PromptAssembler {
    fn default() -> Self { Self { template: PROMPT_TEMPLATE.to_string() } }
}

impl PromptAssembler {
    pub fn new() -> Self { Self::default() }

    /// Custom template; `{query}` and `{search_results}` are substituted.
    pub fn with_template(template: impl Into<String>) -> Self { Self { template: template.into() } }

    /// One `Abstract/Authors/Year` block per match, in ranked order.
    pub fn render_results(matches: &[RankedMatch]) -> String {
        if matches.is_empty() {
            return NO_RESULTS.to_string();
        }
        matches
            .iter()
            .map(|m| {
                format!(
                    "Abstract: {}\nAuthors: {}\nYear: {}\n\n",
                    m.metadata.abstract_text, m.metadata.authors, m.metadata.publication_year
                )
            })
            .collect()
    }

    pub fn assemble(&self, query: &str, matches: &[RankedMatch]) -> String {
        // results first so a literal `{query}` inside an abstract is left alone
        let (head, tail) = self.template.split_once(RESULTS_SLOT).unwrap_or((self.template.as_str(), ""));
        let mut prompt = head.replace(QUERY_SLOT, query);
        prompt.push_str(&Self::render_results(matches));
        prompt.push_str(&tail.replace(QUERY_SLOT, query));
        prompt
    }
}
