//! 基础工具集（进程级共享）
//!
//! 由组合根持有的单例服务：首次访问时构建一次，之后只读共享给所有 Toolbox。
//! 条目均为延迟引用，由 Toolbox 的 ToolLoader 物化；final_answer 由 Toolbox 直接提供。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use crate::tools::{InputSpec, ToolInputs, ToolReference, FINAL_ANSWER};

/// 代码解释器在基础工具集中的名称（默认不加入 Toolbox）
pub const PYTHON_INTERPRETER: &str = "python_interpreter";

/// 一次性构建的基础工具引用集
pub struct BaseToolset {
    references: OnceLock<Vec<ToolReference>>,
    builds: AtomicUsize,
}

impl Default for BaseToolset {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseToolset {
    pub const fn new() -> Self {
        Self {
            references: OnceLock::new(),
            builds: AtomicUsize::new(0),
        }
    }

    /// 进程级实例
    pub fn global() -> &'static BaseToolset {
        static GLOBAL: BaseToolset = BaseToolset::new();
        &GLOBAL
    }

    /// 取基础工具集；首个调用者负责构建
    pub fn references(&self) -> &[ToolReference] {
        self.references.get_or_init(|| {
            self.builds.fetch_add(1, Ordering::SeqCst);
            let refs = default_references();
            tracing::debug!(count = refs.len(), "base toolset built");
            refs
        })
    }

    /// 实际构建次数（至多为 1）
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

fn inputs(items: &[(&str, &str, &str)]) -> ToolInputs {
    items
        .iter()
        .map(|(name, kind, desc)| (name.to_string(), InputSpec::new(*kind, *desc)))
        .collect()
}

fn reference(
    name: &str,
    task: &str,
    description: &str,
    inputs: ToolInputs,
    output_type: &str,
) -> ToolReference {
    ToolReference {
        name: name.to_string(),
        description: description.to_string(),
        inputs,
        output_type: output_type.to_string(),
        task: task.to_string(),
        repo_id: None,
    }
}

fn default_references() -> Vec<ToolReference> {
    vec![
        reference(
            "document_qa",
            "document-question-answering",
            "Answers a question about a document given as an image.",
            inputs(&[
                ("document", "image", "The document to read."),
                ("question", "string", "The question in English."),
            ]),
            "string",
        ),
        reference(
            "image_qa",
            "image-question-answering",
            "Answers a question about an image.",
            inputs(&[
                ("image", "image", "The image containing the information."),
                ("question", "string", "The question in English."),
            ]),
            "string",
        ),
        reference(
            "transcriber",
            "speech-to-text",
            "Transcribes an audio recording into text.",
            inputs(&[("audio", "audio", "The audio to transcribe.")]),
            "string",
        ),
        reference(
            "text_to_speech",
            "text-to-speech",
            "Reads a text out loud and returns the audio.",
            inputs(&[("text", "string", "The text to read out loud.")]),
            "audio",
        ),
        reference(
            "translator",
            "translation",
            "Translates a text from one language to another.",
            inputs(&[
                ("text", "string", "The text to translate."),
                ("src_lang", "string", "The language of the text."),
                ("tgt_lang", "string", "The desired output language."),
            ]),
            "string",
        ),
        reference(
            FINAL_ANSWER,
            FINAL_ANSWER,
            "Provides a final answer to the given problem.",
            inputs(&[("answer", "any", "The final answer to the problem")]),
            "any",
        ),
        reference(
            PYTHON_INTERPRETER,
            PYTHON_INTERPRETER,
            "Evaluates a code snippet and returns its printed output and last value.",
            inputs(&[("code", "string", "The code snippet to evaluate.")]),
            "string",
        ),
    ]
}
