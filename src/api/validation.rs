use super::models::SubmitJobRequest;
use crate::queue::{JobId, JobRequest, MediaFormat, RequestError};

/// Turn a wire submission into a job request plus the optional caller id.
pub fn validate_submission(
    payload: SubmitJobRequest,
) -> Result<(Option<JobId>, JobRequest), RequestError> {
    let id = match payload.id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(JobId::parse(raw)?),
    };

    let format = MediaFormat::parse(&payload.format)?;
    let request = JobRequest::new(
        payload.source_id,
        format,
        payload.quality,
        payload.bitrate,
        payload.title,
    )?;

    Ok((id, request))
}
