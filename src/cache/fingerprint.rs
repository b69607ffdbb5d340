//! Cache fingerprints.
//!
//! A snapshot is only valid for the generator topology and timezone that
//! produced it. Both are hashed with blake3 and stored in the snapshot.

use chrono_tz::Tz;

use crate::generator::UrlGenerator;

/// Hex blake3 digest of generator topology and timezone.
pub fn fingerprint<'a>(generators: impl IntoIterator<Item = &'a UrlGenerator>, tz: Tz) -> String {
    let mut hasher = blake3::Hasher::new();
    for generator in generators {
        let line = format!(
            "{}|{}|{}|{}|{}\n",
            generator.position(),
            generator.identifier(),
            generator.resource_type(),
            generator.filter(),
            generator.permalink(),
        );
        hasher.update(line.as_bytes());
    }
    hasher.update(tz.name().as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}
