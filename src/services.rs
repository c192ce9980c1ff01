//! Static catalog of the known worker services.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceProfile {
    pub id: &'static str,
    pub title: &'static str,
    pub tagline: &'static str,
    /// Cover-file extensions the worker accepts.
    pub cover_extensions: &'static [&'static str],
}

pub const DEFAULT_SERVICE: &str = "mp3stego";

pub const SERVICES: [ServiceProfile; 2] = [
    ServiceProfile {
        id: "mp3stego",
        title: "MP3Stego Worker",
        tagline: "Steganography encoder & decoder",
        cover_extensions: &["mp3", "wav"],
    },
    ServiceProfile {
        id: "stegcracker",
        title: "StegCracker Worker",
        tagline: "Steghide bruteforce utility",
        cover_extensions: &["jpeg", "jpg", "bmp", "wav", "au"],
    },
];

impl ServiceProfile {
    /// Whether a file name carries one of the accepted cover extensions.
    pub fn accepts(&self, file_name: &str) -> bool {
        match file_name.rsplit_once('.') {
            Some((_, extension)) => self
                .cover_extensions
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(extension)),
            None => false,
        }
    }
}

pub fn find(id: &str) -> Option<&'static ServiceProfile> {
    SERVICES.iter().find(|service| service.id == id)
}
