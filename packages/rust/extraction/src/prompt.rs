//! Prompt text sent to the language model.

/// System message for every extraction request.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that extracts structured data from text. \
You always respond with valid JSON only.";

const INSTRUCTIONS: &str = r#"You are an expert at extracting art exhibition information from museum and gallery websites.

Analyze the following webpage content and extract ALL current and upcoming exhibitions.

For each exhibition, extract:
- title: The exhibition title
- artist: Artist name(s) if mentioned
- start_date: Start date in YYYY-MM-DD format (or null if not found)
- end_date: End date in YYYY-MM-DD format (or null if not found)
- description: Brief description (max 200 chars)
- image_url: URL of the main exhibition image (full URL, or null if not found)
- exhibition_url: Direct link to the exhibition page (use the source URL if no specific link found)

Return ONLY a valid JSON array of exhibitions. If no exhibitions found, return an empty array [].

Example format:
[
  {
    "title": "Impressionism Today",
    "artist": "Claude Monet",
    "start_date": "2024-01-15",
    "end_date": "2024-04-30",
    "description": "A retrospective of Monet's water lilies series",
    "image_url": "https://example.com/images/monet-exhibition.jpg",
    "exhibition_url": "https://example.com/exhibitions/monet"
  }
]"#;

/// Build the user prompt for one page of sanitized content.
pub fn build_prompt(content: &str, source_url: &str) -> String {
    format!(
        "{INSTRUCTIONS}\n\nWebsite content:\n{content}\n\nSource URL: {source_url}\n\n\
         Return only the JSON array, no other text."
    )
}
