//! Whole queries and responses.

use crate::error::WireError;
use crate::header::{Header, MessageKind, HEADER_LEN};
use crate::name::DomainName;
use crate::record::{Answer, Question, RecordType};
use crate::wire::Reader;

/// Usual upper bound of a multicast DNS packet.
pub const MAX_PACKET_SIZE: usize = 9000;

/// A message asking questions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    pub id: u16,
    pub questions: Vec<Question>,
}

impl Query {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { id: 0, questions }
    }

    /// One question of type `rtype` per name.
    pub fn for_names<'a>(rtype: RecordType, names: impl IntoIterator<Item = &'a DomainName>) -> Self {
        Self::new(
            names
                .into_iter()
                .map(|n| Question::new(n.clone(), rtype))
                .collect(),
        )
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let count = u16::try_from(self.questions.len())
            .map_err(|_| WireError::TooManyEntries("questions"))?;
        let mut buf = Vec::with_capacity(HEADER_LEN + 32 * self.questions.len());
        Header::query(self.id, count).encode(&mut buf);
        for question in &self.questions {
            question.encode(&mut buf);
        }
        Ok(buf)
    }

    /// Decode a packet that must be a query.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        match Message::decode(buf)? {
            Message::Query(query) => Ok(query),
            Message::Response(_) => Err(WireError::UnexpectedKind {
                expected: "query",
                got: "response",
            }),
        }
    }
}

/// An authoritative message carrying answers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub id: u16,
    pub answers: Vec<Answer>,
}

impl Response {
    pub fn new(answers: Vec<Answer>) -> Self {
        Self { id: 0, answers }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let count =
            u16::try_from(self.answers.len()).map_err(|_| WireError::TooManyEntries("answers"))?;
        let mut buf = Vec::with_capacity(HEADER_LEN + 48 * self.answers.len());
        Header::response(self.id, count).encode(&mut buf);
        for answer in &self.answers {
            answer.encode(&mut buf)?;
        }
        Ok(buf)
    }

    /// Decode a packet that must be a response.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        match Message::decode(buf)? {
            Message::Response(response) => Ok(response),
            Message::Query(_) => Err(WireError::UnexpectedKind {
                expected: "response",
                got: "query",
            }),
        }
    }
}

/// Either kind of message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Query(Query),
    Response(Response),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Query(_) => MessageKind::Query,
            Self::Response(_) => MessageKind::Response,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        match self {
            Self::Query(q) => q.encode(),
            Self::Response(r) => r.encode(),
        }
    }

    /// Decode any message.
    ///
    /// The header is validated first. Queries read only the question
    /// section and responses only the answer section; authority and
    /// additional records are skipped.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(buf);
        let header = Header::decode(&mut reader)?;
        match header.kind()? {
            MessageKind::Query => {
                let questions = (0..header.questions)
                    .map(|_| Question::decode(&mut reader))
                    .collect::<Result<_, _>>()?;
                Ok(Self::Query(Query {
                    id: header.id,
                    questions,
                }))
            }
            MessageKind::Response => {
                // Known-answer and question sections are not interpreted.
                for _ in 0..header.questions {
                    Question::decode(&mut reader)?;
                }
                let answers = (0..header.answers)
                    .map(|_| Answer::decode(&mut reader))
                    .collect::<Result<_, _>>()?;
                Ok(Self::Response(Response {
                    id: header.id,
                    answers,
                }))
            }
        }
    }
}

impl From<Query> for Message {
    fn from(query: Query) -> Self {
        Self::Query(query)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}
