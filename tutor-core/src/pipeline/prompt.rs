//! ChatML prompt template.
//!
//! The fine-tuned tutor model was trained on exactly this layout, so the
//! sentinels and line breaks must stay byte-for-byte as they are.

pub const IM_START: &str = "<|im_start|>";
pub const IM_END: &str = "<|im_end|>";

/// Pedagogical policy given to the model on every call.
pub const SYSTEM_PROMPT: &str = concat!(
    "You are an expert who only teaches data activism and Python programming to K–12 students. ",
    "You explain concepts step by step using clear, scaffolded language. ",
    "You never provide exact code solutions. ",
    "If a student submits code with question marks (?), explain what each line is supposed to do ",
    "by guiding them with detailed conceptual steps. ",
    "For general programming questions (like \"What is a function?\"), give a full explanation ",
    "with a short example, but do not solve specific problems. ",
    "If a student asks something unrelated or off-topic, politely redirect them to focus on ",
    "data activism or Python programming.",
);

/// Assembles the system, user and assistant blocks around `context` and `question`.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "{IM_START}system\n{SYSTEM_PROMPT}\n\nContext:\n{context}\n{IM_END}\n\
         {IM_START}user\n{question}\n{IM_END}\n\
         {IM_START}assistant\n"
    )
}
