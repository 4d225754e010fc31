//! Markdown to HTML.

use pulldown_cmark::{html, Options, Parser};

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_SMART_PUNCTUATION
}

pub fn render_markdown(source: &str) -> String {
    let parser = Parser::new_ext(source, options());
    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
