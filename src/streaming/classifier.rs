//! Phase classification of streamed assistant content.
//!
//! The backend embeds phase changes inside the content stream itself, either
//! as sentinel markers (`[THINKING_START]`, `[THINKING_END]`,
//! `[ANSWER_START]`) or, for older backends, only as boilerplate phrases such
//! as `Final Answer:`. [`PhaseClassifier`] turns the decoded messages of one
//! session into thinking/answer updates and a single completion.

use crate::models::DecodedMessage;

pub const THINKING_START: &str = "[THINKING_START]";
pub const THINKING_END: &str = "[THINKING_END]";
pub const ANSWER_START: &str = "[ANSWER_START]";

/// Phrases that introduce the final answer, in English and Chinese
const ANSWER_PHRASES: [&str; 4] = ["Final Answer:", "Final Answer：", "最终答案：", "最终答案:"];

/// Canned phrase some models emit once reasoning is over
const THOUGHT_COMPLETE: &str = "思考完成";

/// Byte length of the longest phrase that can open the answer
const LONGEST_PHRASE_LEN: usize = longest_phrase_len();

/// Punctuation that may trail the thought-complete phrase
const TRAILING_PUNCTUATION: [char; 6] = [',', '，', '.', '。', '!', '！'];

/// Which part of the response is currently streaming
///
/// Ordered so that transitions can only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PhaseState {
    Idle,
    Thinking,
    /// Thinking was closed by a marker; the answer has not begun yet
    AwaitingAnswer,
    Answering,
    Done,
}

/// Sentinel markers recognised in message content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    ThinkingStart,
    ThinkingEnd,
    AnswerStart,
}

impl Marker {
    /// Match content against the sentinel values verbatim
    pub fn parse(content: &str) -> Option<Self> {
        match content {
            THINKING_START => Some(Marker::ThinkingStart),
            THINKING_END => Some(Marker::ThinkingEnd),
            ANSWER_START => Some(Marker::AnswerStart),
            _ => None,
        }
    }
}

/// How the thinking/answer boundary is detected, fixed per session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStrategy {
    /// Explicit sentinel markers in the content stream
    Markers,
    /// Boilerplate phrases inside the text (legacy backends)
    Heuristic,
}

impl DetectionStrategy {
    pub fn from_markers_flag(enabled: bool) -> Self {
        if enabled {
            DetectionStrategy::Markers
        } else {
            DetectionStrategy::Heuristic
        }
    }
}

/// Inputs to the phase state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Marker(Marker),
    /// Ordinary content arrived
    Text,
    /// An answer phrase was found in heuristic mode
    AnswerPhrase,
    Finished,
}

impl PhaseState {
    /// Pure transition function; out-of-order markers leave the state as is
    pub fn transition(self, signal: Signal, strategy: DetectionStrategy) -> PhaseState {
        use PhaseState::*;

        match (self, signal) {
            (Done, _) => Done,
            (_, Signal::Finished) => Done,
            (Idle, Signal::Marker(Marker::ThinkingStart)) => Thinking,
            (Thinking, Signal::Marker(Marker::ThinkingEnd)) => AwaitingAnswer,
            (state, Signal::Marker(Marker::AnswerStart)) if state < Answering => Answering,
            (state, Signal::Marker(_)) => state,
            (Idle, Signal::Text) if strategy == DetectionStrategy::Heuristic => Thinking,
            (AwaitingAnswer, Signal::Text) => Answering,
            (state, Signal::Text) => state,
            (Idle | Thinking | AwaitingAnswer, Signal::AnswerPhrase) => Answering,
            (state, Signal::AnswerPhrase) => state,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == PhaseState::Done
    }
}

/// Incremental change to the thinking or answer text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUpdate {
    /// Text appended since the previous update of the same kind
    pub delta: String,
    /// Full text so far
    pub text: String,
    /// Earlier text was changed; `text` replaces everything shown before
    pub rewritten: bool,
}

impl TextUpdate {
    fn appended(delta: &str, text: &str) -> Self {
        Self {
            delta: delta.to_string(),
            text: text.to_string(),
            rewritten: false,
        }
    }

    fn replaced(text: &str) -> Self {
        Self {
            delta: String::new(),
            text: text.to_string(),
            rewritten: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub finish_reason: Option<String>,
    pub token_usage: Option<u64>,
    pub thinking: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedEvent {
    Thinking(TextUpdate),
    Answer(TextUpdate),
    Complete(Completion),
}

/// Per-session state machine over decoded message content
pub struct PhaseClassifier {
    strategy: DetectionStrategy,
    state: PhaseState,
    thinking: String,
    /// Raw answer text, boilerplate included
    answer: String,
    /// Cleaned answer text as last delivered
    answer_shown: String,
}

impl PhaseClassifier {
    pub fn new(strategy: DetectionStrategy) -> Self {
        Self {
            strategy,
            state: PhaseState::Idle,
            thinking: String::new(),
            answer: String::new(),
            answer_shown: String::new(),
        }
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    pub fn strategy(&self) -> DetectionStrategy {
        self.strategy
    }

    pub fn thinking_text(&self) -> &str {
        &self.thinking
    }

    pub fn answer_text(&self) -> &str {
        &self.answer_shown
    }

    /// Classify one message; returns nothing once the session is done
    pub fn process(&mut self, msg: DecodedMessage) -> Vec<ClassifiedEvent> {
        let mut events = Vec::new();
        if self.state.is_terminal() {
            tracing::trace!("Ignoring message after completion");
            return events;
        }

        if let Some(marker) = Marker::parse(&msg.content) {
            self.apply_marker(marker, &mut events);
        } else if !msg.content.is_empty() {
            self.push_text(&msg.content, &mut events);
        }

        if msg.finished {
            self.complete(msg.finish_reason, msg.token_usage, &mut events);
        }

        events
    }

    /// End of stream without a finishing message
    pub fn finish(&mut self) -> Vec<ClassifiedEvent> {
        let mut events = Vec::new();
        if !self.state.is_terminal() {
            self.complete(None, None, &mut events);
        }
        events
    }

    fn advance(&mut self, signal: Signal) -> PhaseState {
        let previous = self.state;
        self.state = previous.transition(signal, self.strategy);
        if previous != self.state {
            tracing::debug!(from = ?previous, to = ?self.state, ?signal, "Phase transition");
        }
        previous
    }

    fn apply_marker(&mut self, marker: Marker, events: &mut Vec<ClassifiedEvent>) {
        let previous = self.advance(Signal::Marker(marker));
        match (marker, previous, self.state) {
            (Marker::ThinkingStart, PhaseState::Idle, PhaseState::Thinking) => {
                self.thinking.clear();
            }
            (Marker::AnswerStart, before, PhaseState::Answering) if before < PhaseState::Answering => {
                self.answer.clear();
                // Text delivered before the marker is withdrawn
                if !self.answer_shown.is_empty() {
                    self.answer_shown.clear();
                    events.push(ClassifiedEvent::Answer(TextUpdate::replaced("")));
                }
            }
            (Marker::ThinkingEnd, PhaseState::Thinking, PhaseState::AwaitingAnswer) => {}
            _ => {
                tracing::debug!(?marker, state = ?self.state, "Ignoring out-of-order marker");
            }
        }
    }

    fn push_text(&mut self, content: &str, events: &mut Vec<ClassifiedEvent>) {
        self.advance(Signal::Text);

        match self.state {
            PhaseState::Thinking => match self.strategy {
                DetectionStrategy::Markers => {
                    self.thinking.push_str(content);
                    events.push(ClassifiedEvent::Thinking(TextUpdate::appended(
                        content,
                        &self.thinking,
                    )));
                }
                DetectionStrategy::Heuristic => self.push_heuristic_thinking(content, events),
            },
            PhaseState::Idle | PhaseState::Answering => self.push_answer(content, events),
            PhaseState::AwaitingAnswer | PhaseState::Done => {}
        }
    }

    /// Thinking text until a boilerplate phrase reveals where the answer starts
    fn push_heuristic_thinking(&mut self, content: &str, events: &mut Vec<ClassifiedEvent>) {
        let prior = self.thinking.len();
        self.thinking.push_str(content);

        // A phrase wholly inside earlier text would already have matched
        let mut from = prior.saturating_sub(LONGEST_PHRASE_LEN - 1);
        while !self.thinking.is_char_boundary(from) {
            from -= 1;
        }
        let Some(pos) = find_answer_phrase(&self.thinking[from..]).map(|i| from + i) else {
            events.push(ClassifiedEvent::Thinking(TextUpdate::appended(
                content,
                &self.thinking,
            )));
            return;
        };

        let answer = self.thinking.split_off(pos);
        if pos > prior {
            events.push(ClassifiedEvent::Thinking(TextUpdate::appended(
                &self.thinking[prior..],
                &self.thinking,
            )));
        } else if pos < prior {
            // Part of the phrase was already shown as thinking
            events.push(ClassifiedEvent::Thinking(TextUpdate::replaced(&self.thinking)));
        }

        self.advance(Signal::AnswerPhrase);
        self.push_answer(&answer, events);
    }

    fn push_answer(&mut self, content: &str, events: &mut Vec<ClassifiedEvent>) {
        self.answer.push_str(content);
        let cleaned = clean_answer(&self.answer).to_string();

        // Hold back text that may still turn into a boilerplate phrase
        if is_partial_phrase(&cleaned) {
            return;
        }
        self.publish_answer(cleaned, events);
    }

    fn publish_answer(&mut self, cleaned: String, events: &mut Vec<ClassifiedEvent>) {
        if cleaned == self.answer_shown {
            return;
        }

        let update = match cleaned.strip_prefix(self.answer_shown.as_str()) {
            Some(delta) => TextUpdate::appended(delta, &cleaned),
            None => TextUpdate::replaced(&cleaned),
        };
        self.answer_shown = cleaned;
        events.push(ClassifiedEvent::Answer(update));
    }

    fn complete(
        &mut self,
        finish_reason: Option<String>,
        token_usage: Option<u64>,
        events: &mut Vec<ClassifiedEvent>,
    ) {
        // Legacy responses that never announced an answer are all answer
        if self.strategy == DetectionStrategy::Heuristic
            && self.state < PhaseState::Answering
            && self.answer.is_empty()
            && !self.thinking.is_empty()
        {
            self.answer = std::mem::take(&mut self.thinking);
            events.push(ClassifiedEvent::Thinking(TextUpdate::replaced("")));
        }

        let flushed = clean_answer(&self.answer).to_string();
        self.publish_answer(flushed, events);

        self.advance(Signal::Finished);
        events.push(ClassifiedEvent::Complete(Completion {
            finish_reason,
            token_usage,
            thinking: self.thinking.clone(),
            answer: self.answer_shown.clone(),
        }));
    }
}

const fn longest_phrase_len() -> usize {
    let mut longest = THOUGHT_COMPLETE.len();
    let mut i = 0;
    while i < ANSWER_PHRASES.len() {
        if ANSWER_PHRASES[i].len() > longest {
            longest = ANSWER_PHRASES[i].len();
        }
        i += 1;
    }
    longest
}

/// Byte offset of the earliest answer phrase in `text`
fn find_answer_phrase(text: &str) -> Option<usize> {
    ANSWER_PHRASES
        .iter()
        .chain(std::iter::once(&THOUGHT_COMPLETE))
        .filter_map(|phrase| text.find(phrase))
        .min()
}

/// Strip leading boilerplate phrases from the answer text
fn clean_answer(text: &str) -> &str {
    let mut rest = text.trim_start();
    loop {
        if let Some(stripped) = ANSWER_PHRASES
            .iter()
            .find_map(|phrase| rest.strip_prefix(phrase))
        {
            rest = stripped.trim_start();
        } else if let Some(stripped) = rest.strip_prefix(THOUGHT_COMPLETE) {
            rest = stripped
                .trim_start_matches(TRAILING_PUNCTUATION)
                .trim_start();
        } else {
            return rest;
        }
    }
}

fn is_partial_phrase(text: &str) -> bool {
    !text.is_empty()
        && ANSWER_PHRASES
            .iter()
            .chain(std::iter::once(&THOUGHT_COMPLETE))
            .any(|phrase| phrase.len() > text.len() && phrase.starts_with(text))
}
