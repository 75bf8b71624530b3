//! 프롬프트 템플릿과 컨텍스트 조립

use crate::knowledge::RetrievedChunk;

/// 컨텍스트 블록에서 청크 사이 구분자
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// 컨텍스트에 근거해서만 답하도록 지시하는 고정 템플릿
pub const PROMPT_TEMPLATE: &str = "Answer the question based only on the following context. \
If the context does not contain the information needed, say that you cannot find this information \
in the provided documents instead of guessing.\n\n\
Context:\n{context}\n\n\
Question: {question}\n\n\
Answer:";

/// 검색 결과가 충분히 관련되지 않을 때의 고정 답변
pub const FALLBACK_ANSWER: &str =
    "I don't have enough information in the provided documents to answer that question.";

/// 검색된 청크 텍스트를 구분자로 이어 붙임
pub fn assemble_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// `{context}` / `{question}` 치환 (한 번만 훑음)
///
/// 치환된 값 안의 자리표시자 문자열은 다시 확장하지 않습니다.
/// 모르는 `{...}`는 그대로 둡니다.
pub fn render(template: &str, context: &str, question: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::ChunkMetadata;
    use crate::loader::DocumentMetadata;

    fn retrieved(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "a.pdf:1:0".to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata {
                document: DocumentMetadata {
                    source: "a.pdf".to_string(),
                    page: 1,
                    total_pages: 1,
                },
                chunk_index: 0,
            },
            score: 1.0,
        }
    }

    #[test]
    fn test_assemble_context() {
        let context = assemble_context(&[retrieved("first"), retrieved("second")]);
        assert_eq!(context, "first\n\nsecond");
        assert_eq!(assemble_context(&[]), "");
    }

    #[test]
    fn test_render_fills_placeholders() {
        let prompt = render(PROMPT_TEMPLATE, "CTX", "What?");
        assert!(prompt.contains("Context:\nCTX\n\nQuestion: What?\n\nAnswer:"));
        assert!(prompt.starts_with("Answer the question based only on the following context."));
    }

    #[test]
    fn test_render_does_not_reexpand_values() {
        let prompt = render("{context}|{question}", "see {question}", "{context}?");
        assert_eq!(prompt, "see {question}|{context}?");
    }

    #[test]
    fn test_render_keeps_unknown_braces() {
        assert_eq!(render("{x} {context} {", "c", "q"), "{x} c {");
    }
}
