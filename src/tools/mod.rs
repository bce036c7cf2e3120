pub mod llm;
pub mod sendgrid;
pub mod tavily;
