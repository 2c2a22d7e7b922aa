use crate::Error;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Protein {
    pub accession: String,
    pub description: String,
    pub sequence: String,
    pub decoy: bool,
}

impl Protein {
    /// M-preserving reversal: if the protein starts with an initiator
    /// methionine, it stays in place and the rest of the sequence is reversed
    pub fn reverse(&self, decoy_tag: &str) -> Protein {
        let sequence = match self.sequence.strip_prefix('M') {
            Some(rest) => std::iter::once('M').chain(rest.chars().rev()).collect(),
            None => self.sequence.chars().rev().collect(),
        };
        Protein {
            accession: format!("{}{}", decoy_tag, self.accession),
            description: self.description.clone(),
            sequence,
            decoy: true,
        }
    }
}

pub struct Fasta {
    pub proteins: Vec<Arc<Protein>>,
    pub decoy_tag: String,
}

impl Fasta {
    // Parse a string into a fasta database
    pub fn parse<S: Into<String>>(contents: &str, decoy_tag: S) -> Fasta {
        let decoy_tag = decoy_tag.into();

        let mut proteins = Vec::new();
        let mut header: Option<&str> = None;
        let mut s = String::new();

        let mut push = |header: Option<&str>, sequence: String| {
            let header = match header {
                Some(header) => header,
                None => return,
            };
            let (accession, description) = match header.split_once(char::is_whitespace) {
                Some((acc, desc)) => (acc.to_string(), desc.trim().to_string()),
                None => (header.to_string(), String::new()),
            };
            if accession.is_empty() {
                log::warn!("skipping FASTA entry without an accession");
                return;
            }
            proteins.push(Arc::new(Protein {
                decoy: accession.contains(&decoy_tag),
                accession,
                description,
                sequence,
            }));
        };

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(id) = line.strip_prefix('>') {
                push(header, std::mem::take(&mut s));
                header = Some(id.trim());
            } else {
                s.extend(
                    line.chars()
                        .filter(|c| c.is_ascii_alphabetic())
                        .map(|c| c.to_ascii_uppercase()),
                );
            }
        }
        push(header, s);

        Fasta {
            proteins,
            decoy_tag,
        }
    }

    pub fn targets(&self) -> usize {
        self.proteins.iter().filter(|p| !p.decoy).count()
    }

    pub fn decoys(&self) -> usize {
        self.proteins.len() - self.targets()
    }

    /// Every protein followed by its reversed decoy. Decoys are generated
    /// internally, so an input that already carries one is rejected
    pub fn with_reversed_decoys(&self) -> Result<Vec<Arc<Protein>>, Error> {
        if let Some(decoy) = self.proteins.iter().find(|p| p.decoy) {
            return Err(Error::DecoyContradiction(decoy.accession.clone()));
        }
        Ok(self
            .proteins
            .iter()
            .flat_map(|p| [p.clone(), Arc::new(p.reverse(&self.decoy_tag))])
            .collect())
    }
}
