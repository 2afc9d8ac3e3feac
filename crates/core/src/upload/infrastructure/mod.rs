pub mod presigned_post_uploader;
