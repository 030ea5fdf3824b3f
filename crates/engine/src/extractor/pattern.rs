//! Deterministic, rule-based fact extraction.
//!
//! The user input is split into sentences and then into clauses; each
//! clause is matched against a table of first-person declarations. The
//! first rule that matches a clause wins.

use std::collections::BTreeSet;

use async_trait::async_trait;
use mnemo_core::{FactCandidate, Importance, THREAD_SCOPED_TAG};
use tracing::debug;

use super::{FactExtractor, is_small_talk};

/// Confidence bonus when the assistant repeats the captured value back.
const ECHO_BONUS: f32 = 0.05;

/// Words that begin a new declaration after `,`, `;`, `and` or `but`.
const MARKERS: &[&str] = &["i", "i'm", "i've", "my", "call", "remember", "please"];

const CONNECTORS: &[&str] = &["and", "but"];

/// Leading words dropped from a clause before matching.
const FILLERS: &[&str] = &[
    "and", "but", "so", "also", "well", "oh", "btw", "actually", "plus", "hi", "hey", "hello",
    "anyway", "ok", "okay",
];

/// Adverbs ignored right after the subject ("I really like", "I'm currently learning").
const ADVERBS: &[&str] = &[
    "also", "really", "actually", "just", "totally", "absolutely", "still", "currently", "now",
];

/// Words that end a captured value.
const VALUE_STOPS: &[&str] = &[
    "because", "since", "so", "but", "and", "which", "who", "when", "if", "though", "although",
    "where", "while",
];

const JOB_NOUNS: &[&str] = &[
    "developer", "engineer", "programmer", "designer", "teacher", "doctor", "nurse", "lawyer",
    "student", "scientist", "manager", "writer", "artist", "accountant", "consultant", "analyst",
    "architect", "chef", "musician", "researcher", "professor", "founder", "freelancer",
    "photographer", "pharmacist", "dentist", "electrician", "plumber", "mechanic", "pilot",
    "journalist", "editor", "translator", "therapist", "veterinarian", "farmer", "entrepreneur",
    "administrator", "technician", "marketer", "recruiter", "economist", "mathematician",
    "physicist", "chemist", "biologist", "paramedic", "firefighter", "officer", "cto", "ceo",
];

/// Capitalized words after "I'm" that are not names.
const NOT_NAMES: &[&str] = &[
    "sorry", "fine", "good", "ok", "okay", "here", "back", "sure", "not", "so", "very", "glad",
    "happy", "sad", "tired", "hungry", "bored", "busy", "excited", "done", "ready", "stuck",
    "new", "curious", "going", "trying", "looking", "wondering", "afraid", "confused", "english",
];

/// Goals that are really requests for the current exchange.
const REQUEST_VERBS: &[&str] = &[
    "know", "ask", "see", "check", "understand", "say", "talk", "hear", "try", "chat", "thank",
    "grab", "get", "tell", "show", "share", "clarify", "confirm", "add", "mention",
    "apologize", "continue", "stop", "start", "quit", "leave", "sleep", "eat",
];

/// Words that tie a captured value to the current exchange rather than the
/// user ("your answer", "the way you explained that", "lunch now").
const SITUATIONAL: &[&str] = &[
    "you", "your", "yours", "you're", "you've", "now", "today", "tonight",
];

/// Phrases asking for a fact to be kept for the current thread only.
const THREAD_SCOPE_CUES: &[&str] = &[
    "for this conversation",
    "for this chat",
    "for this session",
    "in this conversation",
    "in this chat",
];

const RELATIONS: &[&str] = &[
    "wife", "husband", "partner", "boyfriend", "girlfriend", "son", "daughter", "sister",
    "brother", "mother", "mom", "father", "dad", "grandmother", "grandfather", "dog", "cat",
    "pet",
];

const PETS: &[&str] = &["dog", "cat", "pet"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    /// First word, then further capitalized words
    Name,
    /// A job title, with leading articles stripped
    Job,
    /// A job title that must contain a known job noun
    JobNoun,
    Place,
    /// A short object phrase ("hiking", "dark roast coffee")
    Phrase,
    Goal,
    /// Everything to the end of the clause
    Free,
}

impl Capture {
    fn max_words(self) -> usize {
        match self {
            Self::Name => 3,
            Self::Job | Self::JobNoun | Self::Place => 5,
            Self::Phrase => 6,
            Self::Goal => 8,
            Self::Free => 40,
        }
    }

    fn extra_stops(self) -> &'static [&'static str] {
        match self {
            Self::Job | Self::JobNoun => &["at", "for", "in", "with"],
            Self::Place => &["with", "for", "and"],
            _ => &[],
        }
    }
}

struct Rule {
    prefix: &'static [&'static str],
    question: &'static str,
    tag: &'static str,
    importance: Importance,
    confidence: f32,
    capture: Capture,
    answer_prefix: &'static str,
}

const fn rule(
    prefix: &'static [&'static str],
    question: &'static str,
    tag: &'static str,
    importance: Importance,
    confidence: f32,
    capture: Capture,
) -> Rule {
    Rule {
        prefix,
        question,
        tag,
        importance,
        confidence,
        capture,
        answer_prefix: "",
    }
}

const fn studying(prefix: &'static [&'static str], answer_prefix: &'static str) -> Rule {
    Rule {
        prefix,
        question: GOAL_QUESTION,
        tag: "goals",
        importance: Importance::Low,
        confidence: 0.6,
        capture: Capture::Goal,
        answer_prefix,
    }
}

const NAME_QUESTION: &str = "What is the user's name?";
const EMPLOYER_QUESTION: &str = "Where does the user work?";
const JOB_QUESTION: &str = "What does the user do for work?";
const HOME_QUESTION: &str = "Where does the user live?";
const ORIGIN_QUESTION: &str = "Where is the user from?";
const LIKE_QUESTION: &str = "What does the user enjoy?";
const DISLIKE_QUESTION: &str = "What does the user dislike?";
const GOAL_QUESTION: &str = "What is the user working toward?";
const EXPLICIT_QUESTION: &str = "What did the user ask to remember?";

use Capture::*;
use Importance::{High, Low, Medium};

static RULES: &[Rule] = &[
    // explicit requests
    rule(&["please", "remember", "that"], EXPLICIT_QUESTION, "explicit", High, 0.95, Free),
    rule(&["remember", "that"], EXPLICIT_QUESTION, "explicit", High, 0.95, Free),
    rule(&["please", "remember"], EXPLICIT_QUESTION, "explicit", High, 0.95, Free),
    // name
    rule(&["my", "name", "is"], NAME_QUESTION, "identity", High, 0.9, Name),
    rule(&["my", "name's"], NAME_QUESTION, "identity", High, 0.9, Name),
    rule(&["please", "call", "me"], NAME_QUESTION, "identity", High, 0.9, Name),
    rule(&["call", "me"], NAME_QUESTION, "identity", High, 0.9, Name),
    rule(&["i'm", "called"], NAME_QUESTION, "identity", High, 0.9, Name),
    rule(&["i", "am", "called"], NAME_QUESTION, "identity", High, 0.9, Name),
    rule(&["i", "go", "by"], NAME_QUESTION, "identity", High, 0.9, Name),
    // employer
    rule(&["i", "work", "at"], EMPLOYER_QUESTION, "work", High, 0.85, Place),
    rule(&["i", "work", "for"], EMPLOYER_QUESTION, "work", High, 0.85, Place),
    rule(&["i'm", "working", "at"], EMPLOYER_QUESTION, "work", High, 0.85, Place),
    rule(&["i", "am", "working", "at"], EMPLOYER_QUESTION, "work", High, 0.85, Place),
    rule(&["i'm", "employed", "at"], EMPLOYER_QUESTION, "work", High, 0.85, Place),
    rule(&["i'm", "employed", "by"], EMPLOYER_QUESTION, "work", High, 0.85, Place),
    // occupation
    rule(&["i", "work", "as"], JOB_QUESTION, "work", Medium, 0.8, Job),
    rule(&["i'm", "working", "as"], JOB_QUESTION, "work", Medium, 0.8, Job),
    rule(&["my", "job", "is"], JOB_QUESTION, "work", Medium, 0.8, Job),
    rule(&["my", "profession", "is"], JOB_QUESTION, "work", Medium, 0.8, Job),
    rule(&["i'm", "a"], JOB_QUESTION, "work", Medium, 0.8, JobNoun),
    rule(&["i'm", "an"], JOB_QUESTION, "work", Medium, 0.8, JobNoun),
    rule(&["i", "am", "a"], JOB_QUESTION, "work", Medium, 0.8, JobNoun),
    rule(&["i", "am", "an"], JOB_QUESTION, "work", Medium, 0.8, JobNoun),
    // location
    rule(&["i", "live", "in"], HOME_QUESTION, "location", Medium, 0.8, Place),
    rule(&["i'm", "living", "in"], HOME_QUESTION, "location", Medium, 0.8, Place),
    rule(&["i", "am", "living", "in"], HOME_QUESTION, "location", Medium, 0.8, Place),
    rule(&["i'm", "based", "in"], HOME_QUESTION, "location", Medium, 0.8, Place),
    rule(&["i", "am", "based", "in"], HOME_QUESTION, "location", Medium, 0.8, Place),
    rule(&["i", "moved", "to"], HOME_QUESTION, "location", Medium, 0.8, Place),
    rule(&["i'm", "from"], ORIGIN_QUESTION, "location", Medium, 0.8, Place),
    rule(&["i", "am", "from"], ORIGIN_QUESTION, "location", Medium, 0.8, Place),
    rule(&["i", "come", "from"], ORIGIN_QUESTION, "location", Medium, 0.8, Place),
    rule(&["my", "hometown", "is"], ORIGIN_QUESTION, "location", Medium, 0.8, Place),
    // preferences
    rule(&["i", "don't", "like"], DISLIKE_QUESTION, "preferences", Medium, 0.75, Phrase),
    rule(&["i", "do", "not", "like"], DISLIKE_QUESTION, "preferences", Medium, 0.75, Phrase),
    rule(&["i", "hate"], DISLIKE_QUESTION, "preferences", Medium, 0.75, Phrase),
    rule(&["i", "dislike"], DISLIKE_QUESTION, "preferences", Medium, 0.75, Phrase),
    rule(&["i", "can't", "stand"], DISLIKE_QUESTION, "preferences", Medium, 0.75, Phrase),
    rule(&["i", "prefer"], "What does the user prefer?", "preferences", Medium, 0.75, Phrase),
    rule(&["i", "like"], LIKE_QUESTION, "preferences", Medium, 0.75, Phrase),
    rule(&["i", "love"], LIKE_QUESTION, "preferences", Medium, 0.75, Phrase),
    rule(&["i", "enjoy"], LIKE_QUESTION, "preferences", Medium, 0.75, Phrase),
    // goals
    rule(&["my", "goal", "is", "to"], GOAL_QUESTION, "goals", Low, 0.6, Goal),
    rule(&["my", "goal", "is"], GOAL_QUESTION, "goals", Low, 0.6, Goal),
    rule(&["i", "want", "to"], GOAL_QUESTION, "goals", Low, 0.6, Goal),
    rule(&["i'm", "trying", "to"], GOAL_QUESTION, "goals", Low, 0.6, Goal),
    rule(&["i", "am", "trying", "to"], GOAL_QUESTION, "goals", Low, 0.6, Goal),
    rule(&["i", "plan", "to"], GOAL_QUESTION, "goals", Low, 0.6, Goal),
    rule(&["i'm", "planning", "to"], GOAL_QUESTION, "goals", Low, 0.6, Goal),
    studying(&["i'm", "learning"], "learning "),
    studying(&["i", "am", "learning"], "learning "),
    studying(&["i'm", "studying"], "studying "),
    studying(&["i", "am", "studying"], "studying "),
    // other personal attributes
    rule(&["my", "birthday", "is"], "When is the user's birthday?", "identity", Medium, 0.85, Phrase),
    rule(&["my", "pronouns", "are"], "What are the user's pronouns?", "identity", Medium, 0.85, Phrase),
    rule(&["my", "native", "language", "is"], "What is the user's native language?", "identity", Medium, 0.85, Phrase),
    rule(&["my", "first", "language", "is"], "What is the user's native language?", "identity", Medium, 0.85, Phrase),
    rule(&["my", "timezone", "is"], "What is the user's timezone?", "location", Medium, 0.8, Phrase),
];

/// A whitespace token: the text as typed, and a normalized form for matching.
#[derive(Debug, Clone)]
struct Word {
    text: String,
    norm: String,
    breaks_after: bool,
}

impl Word {
    fn new(token: &str) -> Self {
        let breaks_after = token.ends_with([',', ';']);
        let stripped = token.trim_matches(is_edge_punct);
        let mut norm = stripped.to_lowercase().replace('’', "'");
        match norm.as_str() {
            "im" => norm = "i'm".into(),
            "favourite" => norm = "favorite".into(),
            _ => {}
        }
        Self {
            text: token.to_string(),
            norm,
            breaks_after,
        }
    }

    fn is_capitalized(&self) -> bool {
        self.text
            .trim_start_matches(is_edge_punct)
            .chars()
            .next()
            .is_some_and(char::is_uppercase)
    }
}

fn is_edge_punct(c: char) -> bool {
    matches!(
        c,
        ',' | '.' | ';' | ':' | '!' | '?' | '"' | '(' | ')' | '“' | '”' | '\'' | '‘' | '’'
    )
}

/// One matched declaration, before it becomes a candidate.
struct Match {
    question: String,
    value: String,
    answer_prefix: &'static str,
    tag: &'static str,
    importance: Importance,
    confidence: f32,
}

/// Rule-table extractor. Needs no model and always returns promptly.
#[derive(Debug, Default, Clone)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    /// All candidates in `user_input`, boosted when `ai_response` echoes
    /// the captured value. Questions sharing a phrasing are merged.
    pub fn extract_sync(&self, user_input: &str, ai_response: &str) -> Vec<FactCandidate> {
        if is_small_talk(user_input) {
            return Vec::new();
        }
        let response = ai_response.to_lowercase();

        let mut candidates: Vec<FactCandidate> = Vec::new();
        for sentence in sentences(user_input) {
            let Some(statement) = declarative_part(sentence) else {
                continue;
            };
            let (statement, thread_scoped) = strip_scope_cue(statement);
            for clause in clauses(&statement) {
                let Some(m) = match_clause(&clause) else {
                    continue;
                };
                let mut confidence = m.confidence;
                if response.contains(&m.value.to_lowercase()) {
                    confidence = (confidence + ECHO_BONUS).min(1.0);
                }
                let mut tags = BTreeSet::from([m.tag.to_string()]);
                if thread_scoped {
                    tags.insert(THREAD_SCOPED_TAG.to_string());
                }
                merge(
                    &mut candidates,
                    FactCandidate {
                        question: m.question,
                        answer: format!("{}{}", m.answer_prefix, m.value),
                        tags,
                        importance: m.importance,
                        confidence,
                        justification: justification(m.tag).to_string(),
                    },
                );
            }
        }
        debug!(count = candidates.len(), "Pattern extraction finished");
        candidates
    }
}

#[async_trait]
impl FactExtractor for PatternExtractor {
    fn name(&self) -> &str {
        "pattern"
    }

    async fn extract(&self, user_input: &str, ai_response: &str) -> Vec<FactCandidate> {
        self.extract_sync(user_input, ai_response)
    }
}

fn justification(tag: &str) -> &'static str {
    match tag {
        "identity" => "The user shared a stable personal detail about themselves",
        "work" => "The user described their work, which stays relevant across conversations",
        "location" => "Where the user lives or comes from rarely changes",
        "preferences" => "A stated preference helps personalize later answers",
        "family" => "Close relationships are long-lived context",
        "pets" => "Pets are long-lived context the user may mention again",
        "goals" => "An ongoing goal shapes what help the user will want next",
        "explicit" => "The user explicitly asked for this to be remembered",
        _ => "The user stated a lasting fact about themselves",
    }
}

/// Same question: keep the first candidate, fold in any new answer.
fn merge(candidates: &mut Vec<FactCandidate>, candidate: FactCandidate) {
    match candidates.iter_mut().find(|c| c.question == candidate.question) {
        Some(existing) => {
            let known = existing
                .answer
                .split(", ")
                .any(|a| a.eq_ignore_ascii_case(&candidate.answer));
            if !known {
                existing.answer = format!("{}, {}", existing.answer, candidate.answer);
            }
            existing.confidence = existing.confidence.max(candidate.confidence);
            existing.importance = existing.importance.max(candidate.importance);
        }
        None => candidates.push(candidate),
    }
}

/// Split at `.`, `!` or `?` followed by whitespace or end of input.
fn sentences(input: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = input.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = input[start..end].trim();
                if !sentence.is_empty() {
                    out.push(sentence);
                }
                start = end;
            }
        }
    }
    let rest = input[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// The part of a sentence that states something. A trailing question is
/// cut at its last `,` or `;` ("I'm Alex, what's yours?"); a sentence that
/// is only a question has none.
fn declarative_part(sentence: &str) -> Option<&str> {
    if !sentence.trim_end().ends_with('?') {
        return Some(sentence);
    }
    let cut = sentence.rfind([',', ';'])?;
    let head = sentence[..cut].trim();
    (!head.is_empty()).then_some(head)
}

/// The sentence without its thread-scope cue, and whether it had one.
fn strip_scope_cue(sentence: &str) -> (String, bool) {
    // ASCII lowercasing keeps byte offsets valid for slicing `sentence`.
    let lower = sentence.to_ascii_lowercase();
    for cue in THREAD_SCOPE_CUES {
        if let Some(at) = lower.find(cue) {
            let head = sentence[..at].trim_end_matches([',', ' ']);
            let tail = &sentence[at + cue.len()..];
            return (format!("{head}{tail}"), true);
        }
    }
    (sentence.to_string(), false)
}

/// Break a sentence into clauses at `,` `;` `and` `but`, but only where
/// the next words open a new first-person declaration.
fn clauses(sentence: &str) -> Vec<Vec<Word>> {
    let words: Vec<Word> = sentence.split_whitespace().map(Word::new).collect();
    let mut out = Vec::new();
    let mut current: Vec<Word> = Vec::new();

    for (i, word) in words.iter().enumerate() {
        let boundary = i > 0
            && (words[i - 1].breaks_after || CONNECTORS.contains(&word.norm.as_str()));
        if boundary && !current.is_empty() && opens_declaration(&words[i..]) {
            out.push(std::mem::take(&mut current));
        }
        current.push(word.clone());
    }
    if !current.is_empty() {
        out.push(current);
    }

    out.into_iter().map(tidy).filter(|c| !c.is_empty()).collect()
}

fn opens_declaration(rest: &[Word]) -> bool {
    rest.iter()
        .find(|w| !FILLERS.contains(&w.norm.as_str()))
        .is_some_and(|w| MARKERS.contains(&w.norm.as_str()))
}

/// Drop leading fillers and adverbs right after the subject.
fn tidy(clause: Vec<Word>) -> Vec<Word> {
    let mut words: Vec<Word> = clause
        .into_iter()
        .skip_while(|w| FILLERS.contains(&w.norm.as_str()) || w.norm.is_empty())
        .collect();
    let mut i = 1;
    while i < words.len().min(4) {
        let after_subject = matches!(words[i - 1].norm.as_str(), "i" | "i'm" | "am");
        if after_subject && ADVERBS.contains(&words[i].norm.as_str()) {
            words.remove(i);
        } else {
            i += 1;
        }
    }
    words
}

fn starts_with(clause: &[Word], prefix: &[&str]) -> bool {
    clause.len() > prefix.len()
        && clause.iter().zip(prefix).all(|(w, p)| w.norm == *p)
}

fn match_clause(clause: &[Word]) -> Option<Match> {
    for rule in RULES {
        if !starts_with(clause, rule.prefix) {
            continue;
        }
        let value = capture(&clause[rule.prefix.len()..], rule.capture)?;
        return Some(Match {
            question: rule.question.to_string(),
            value,
            answer_prefix: rule.answer_prefix,
            tag: rule.tag,
            importance: rule.importance,
            confidence: rule.confidence,
        });
    }
    favorite(clause)
        .or_else(|| relation(clause))
        .or_else(|| age(clause))
        .or_else(|| bare_name(clause))
}

/// Captured value for a rule, or `None` when the words fail its guard.
fn capture(rest: &[Word], kind: Capture) -> Option<String> {
    let extra = kind.extra_stops();
    let mut taken: Vec<&Word> = Vec::new();
    for (i, word) in rest.iter().enumerate() {
        let norm = word.norm.as_str();
        if kind != Free && (VALUE_STOPS.contains(&norm) || extra.contains(&norm)) {
            break;
        }
        if kind == Name && i > 0 && !word.is_capitalized() {
            break;
        }
        if taken.len() == kind.max_words() {
            break;
        }
        taken.push(word);
    }

    match kind {
        Job | JobNoun => {
            while taken
                .first()
                .is_some_and(|w| matches!(w.norm.as_str(), "a" | "an" | "the"))
            {
                taken.remove(0);
            }
        }
        Phrase | Goal => {
            if taken.first().is_some_and(|w| w.norm == "to") {
                taken.remove(0);
            }
        }
        _ => {}
    }

    let first = taken.first()?;
    let situational = || taken.iter().any(|w| SITUATIONAL.contains(&w.norm.as_str()));
    let rejected = match kind {
        JobNoun => !taken.iter().any(|w| is_job_noun(&w.norm)),
        Phrase => {
            matches!(
                first.norm.as_str(),
                "it" | "that" | "this" | "them" | "him" | "her" | "those" | "these"
            ) || situational()
        }
        Goal => {
            REQUEST_VERBS.contains(&first.norm.as_str())
                // "go to Japan" is a plan, "go grab lunch" is an errand
                || (first.norm == "go" && taken.get(1).is_none_or(|w| w.norm != "to"))
                || situational()
        }
        _ => false,
    };
    if rejected {
        return None;
    }
    join_value(&taken)
}

fn is_job_noun(norm: &str) -> bool {
    JOB_NOUNS.contains(&norm) || norm.strip_suffix('s').is_some_and(|s| JOB_NOUNS.contains(&s))
}

fn join_value(words: &[&Word]) -> Option<String> {
    let joined = words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
    let value = joined.trim_matches(|c: char| is_edge_punct(c) || c.is_whitespace());
    (!value.is_empty()).then(|| value.to_string())
}

/// "my favorite X is Y"
fn favorite(clause: &[Word]) -> Option<Match> {
    if clause.len() < 5 || clause[0].norm != "my" || clause[1].norm != "favorite" {
        return None;
    }
    let verb = clause
        .iter()
        .skip(3)
        .position(|w| w.norm == "is" || w.norm == "are")?
        + 3;
    let subject = clause[2..verb]
        .iter()
        .map(|w| w.norm.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let value = capture(&clause[verb + 1..], Phrase)?;
    Some(Match {
        question: format!("What is the user's favorite {subject}?"),
        value,
        answer_prefix: "",
        tag: "preferences",
        importance: Medium,
        confidence: 0.85,
    })
}

/// "my sister is Maya", "my dog's name is Rex", "my wife is called Ana"
fn relation(clause: &[Word]) -> Option<Match> {
    if clause.len() < 4 || clause[0].norm != "my" {
        return None;
    }
    let rel = clause[1].norm.trim_end_matches("'s");
    if !RELATIONS.contains(&rel) {
        return None;
    }
    let norms: Vec<&str> = clause.iter().map(|w| w.norm.as_str()).collect();
    let start = match &norms[2..] {
        ["name", "is", ..] if clause[1].norm.ends_with("'s") => 4,
        ["is", "named" | "called", ..] => 4,
        ["is", ..] | ["named" | "called", ..] => 3,
        _ => return None,
    };
    let rest = clause.get(start..)?;
    if !rest.first()?.is_capitalized() {
        return None;
    }
    let value = capture(rest, Name)?;
    let pet = PETS.contains(&rel);
    Some(Match {
        question: if pet {
            format!("What is the name of the user's {rel}?")
        } else {
            format!("Who is the user's {rel}?")
        },
        value,
        answer_prefix: "",
        tag: if pet { "pets" } else { "family" },
        importance: Medium,
        confidence: 0.8,
    })
}

/// "I am 34 years old", "I'm 34 years old"
fn age(clause: &[Word]) -> Option<Match> {
    let norms: Vec<&str> = clause.iter().map(|w| w.norm.as_str()).collect();
    let (number, unit) = match norms.as_slice() {
        ["i'm", n, u, ..] | ["i", "am", n, u, ..] => (*n, *u),
        _ => return None,
    };
    let years: u8 = number.parse().ok()?;
    if !matches!(unit, "years" | "year" | "yrs") {
        return None;
    }
    Some(Match {
        question: "How old is the user?".into(),
        value: years.to_string(),
        answer_prefix: "",
        tag: "identity",
        importance: Medium,
        confidence: 0.85,
    })
}

/// "I'm Alex": a capitalized word after "I'm" that is not a state or mood.
fn bare_name(clause: &[Word]) -> Option<Match> {
    let start = match clause.first()?.norm.as_str() {
        "i'm" => 1,
        "i" if clause.get(1)?.norm == "am" => 2,
        _ => return None,
    };
    let first = clause.get(start)?;
    if !first.is_capitalized() || NOT_NAMES.contains(&first.norm.as_str()) {
        return None;
    }
    let value = capture(&clause[start..], Name)?;
    Some(Match {
        question: NAME_QUESTION.into(),
        value,
        answer_prefix: "",
        tag: "identity",
        importance: High,
        confidence: 0.9,
    })
}
