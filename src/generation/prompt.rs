//! Prompt assembly and the model-free fallback document.

use docflow_core::models::{OutputFormat, Template};
use docflow_core::retrieval::{truncate_chars, ContextExcerpt};

pub const SYSTEM_INSTRUCTION: &str = "You are an assistant specialized in document generation. \
Create a professional document based on the provided information. \
Follow any templates or guidelines provided. \
Use formal language and proper formatting.";

fn format_instruction(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Docx | OutputFormat::Pdf | OutputFormat::Txt => {
            "Structure the document with headings marked by leading '#' characters \
(one per level) and plain paragraphs separated by blank lines."
        }
        OutputFormat::Markdown => "Format the document as Markdown.",
        OutputFormat::Html => "Format the document as a complete, self-contained HTML page.",
    }
}

/// Builds the model prompt in a fixed order: system instruction,
/// reference excerpts, template, format instruction, then the task.
pub struct PromptBuilder<'a> {
    prompt: &'a str,
    format: OutputFormat,
    excerpts: &'a [ContextExcerpt],
    template: Option<&'a Template>,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(prompt: &'a str, format: OutputFormat) -> Self {
        Self {
            prompt,
            format,
            excerpts: &[],
            template: None,
        }
    }

    pub fn excerpts(mut self, excerpts: &'a [ContextExcerpt]) -> Self {
        self.excerpts = excerpts;
        self
    }

    pub fn template(mut self, template: Option<&'a Template>) -> Self {
        self.template = template;
        self
    }

    pub fn build(&self) -> String {
        let mut sections: Vec<String> = vec![SYSTEM_INSTRUCTION.to_string()];

        if !self.excerpts.is_empty() {
            let mut context = String::from("Context information:\n");
            for e in self.excerpts {
                context.push_str(&format!("\n--- From {} ---\n{}\n", e.document_title, e.text));
            }
            sections.push(context.trim_end().to_string());
        }

        if let Some(t) = self.template {
            let mut block = format!("Template to follow:\n\n{}", t.body.trim());
            let vars = template_variables(t);
            if !vars.is_empty() {
                block.push_str("\n\nTemplate variables:");
                for (name, value) in vars {
                    block.push_str(&format!("\n- {}: {}", name, value));
                }
            }
            sections.push(block);
        }

        sections.push(format_instruction(self.format).to_string());
        sections.push(format!("Task: {}", self.prompt.trim()));
        sections.join("\n\n")
    }
}

/// Default values first (sorted by name), then placeholders in the body
/// that have no default.
fn template_variables(t: &Template) -> Vec<(String, String)> {
    let mut vars: Vec<(String, String)> = t
        .default_values
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for name in t.placeholders() {
        if !t.default_values.contains_key(&name) {
            vars.push((name.clone(), format!("{{{{{}}}}}", name)));
        }
    }
    vars
}

/// Structured placeholder document used when no generative model is
/// available or it failed.
pub fn fallback_document(
    title: &str,
    prompt: &str,
    template: Option<&Template>,
    excerpts: &[ContextExcerpt],
    excerpt_chars: usize,
) -> String {
    let prompt = prompt.trim();
    let mut out = format!("# {}\n\n", title.trim());

    out.push_str("## Request\n\n");
    if prompt.is_empty() {
        out.push_str("No prompt was provided; this document summarizes the reference material.\n\n");
    } else {
        out.push_str(&format!("\"{}\"\n\n", prompt));
    }

    out.push_str("## Executive Summary\n\n");
    out.push_str(&format!(
        "This document was assembled without a generative model from the request above \
and {} reference document(s).\n\n",
        excerpts.len()
    ));

    out.push_str("## Introduction\n\n");
    out.push_str("The sections below follow the requested structure and collect the material \
available for it.\n\n");

    out.push_str("## Main Content\n\n");
    match template {
        Some(t) => {
            out.push_str(t.fill().trim());
            out.push_str("\n\n");
        }
        None => out.push_str("Content for this section is to be written.\n\n"),
    }

    out.push_str("## Conclusion\n\n");
    out.push_str("Review and complete the sections above before distribution.\n\n");

    out.push_str("## Reference Documents\n");
    if excerpts.is_empty() {
        out.push_str("\nNo reference documents were provided.\n");
    }
    for (i, e) in excerpts.iter().enumerate() {
        out.push_str(&format!("\n### Document {}: {}\n\n", i + 1, e.document_title));
        let excerpt = truncate_chars(e.text.trim(), excerpt_chars);
        let ellipsis = if excerpt.chars().count() < e.text.trim().chars().count() {
            "..."
        } else {
            ""
        };
        out.push_str(&format!("Excerpt: {}{}\n", excerpt, ellipsis));
    }
    out.trim_end().to_string()
}
